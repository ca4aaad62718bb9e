//! HTTP surface.
//!
//! An axum [`Router`] over [`AppState`]. Every protected route passes through
//! the [`Guard`] before doing anything else, and every rejection goes out as
//! `{"error": "..."}` via [`ApiError`].

mod error;
mod handlers;
mod live;

pub use error::{ApiError, ApiResult};

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tower_cookies::CookieManagerLayer;

use crate::auth::{CredentialHasher, Guard, SessionIssuer};
use crate::bus::UpdateBus;
use crate::reports::Reports;
use crate::store::Store;
use crate::{Clock, Config, Error, Result};

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    guard: Guard,
    reports: Reports,
    bus: UpdateBus,
    clock: Arc<dyn Clock>,
    config: Arc<Config>,
    closing: Arc<watch::Sender<bool>>,
}

impl AppState {
    /// Wire the issuer, guard, bus and reports over one store and clock.
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: Config) -> Result<Self> {
        config.validate()?;
        let hasher = CredentialHasher::new(config.password)?;
        let issuer = SessionIssuer::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            hasher,
            config.session.clone(),
        );
        let bus = UpdateBus::new();
        let reports = Reports::new(store, bus.clone(), Arc::clone(&clock));
        let (closing, _) = watch::channel(false);
        Ok(Self {
            guard: Guard::new(issuer),
            reports,
            bus,
            clock,
            config: Arc::new(config),
            closing: Arc::new(closing),
        })
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    pub fn issuer(&self) -> &SessionIssuer {
        self.guard.issuer()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        self.guard.issuer().store()
    }

    pub fn reports(&self) -> &Reports {
        &self.reports
    }

    pub fn bus(&self) -> &UpdateBus {
        &self.bus
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// End every open live feed so graceful shutdown can complete.
    pub fn begin_shutdown(&self) {
        self.closing.send_replace(true);
    }

    fn closing(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/logout", post(handlers::logout))
        .route("/api/me", get(handlers::me))
        .route("/api/live", get(live::live_feed))
        .route(
            "/api/commitments",
            get(handlers::list_commitments).post(handlers::create_commitment),
        )
        .route(
            "/api/commitments/{id}/status",
            post(handlers::update_commitment_status),
        )
        .route(
            "/api/commitments/{id}/history",
            get(handlers::commitment_history),
        )
        .route("/api/alerts", post(handlers::publish_alert))
        .layer(CookieManagerLayer::new())
        .with_state(state)
}

/// Serve until `signal` resolves, then close live feeds and drain connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            tracing::info!("shutting down, closing live feeds");
            state.begin_shutdown();
        })
        .await?;
    Ok(())
}

/// A server running on a background task, stopped explicitly.
pub struct WebServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl WebServer {
    /// Bind `addr` (port 0 picks a free one) and start serving.
    pub async fn start(addr: &str, state: AppState) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(serve(listener, state, async move {
            let _ = shutdown_rx.await;
        }));
        tracing::debug!(%addr, "web server started");

        Ok(Self {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger graceful shutdown and wait for the server task.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Io(std::io::Error::other(e))),
        }
    }
}
