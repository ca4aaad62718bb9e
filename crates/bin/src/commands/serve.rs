//! Serve command - runs the Tally dashboard server.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{SignalKind, signal};

use tally::config::{FeedPolicy, SessionPolicy};
use tally::web::{self, AppState};
use tally::{Config, SystemClock};

use crate::backend::create_store;
use crate::cli::ServeArgs;

/// Map command-line flags onto library policies
fn config_from_args(args: &ServeArgs) -> Config {
    Config {
        session: SessionPolicy {
            ttl: Duration::from_secs(args.session_ttl_hours.saturating_mul(60 * 60)),
            secure: !args.insecure_cookies,
            ..SessionPolicy::default()
        },
        feed: FeedPolicy {
            heartbeat: Duration::from_secs(args.heartbeat_secs),
        },
        ..Config::default()
    }
}

/// Run the Tally server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = config_from_args(args);
    if args.insecure_cookies {
        tracing::warn!("Session cookies will be sent without the Secure attribute");
    }

    let store = create_store(&args.backend_config).await?;
    let state = AppState::new(store, Arc::new(SystemClock), config)?;

    // Expired sessions are never removed on lookup; sweep them periodically
    let purge_every = Duration::from_secs(args.purge_minutes.saturating_mul(60));
    let issuer = state.issuer().clone();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_every);
        loop {
            ticker.tick().await;
            if let Err(e) = issuer.purge_expired().await {
                tracing::warn!("Session purge failed: {e}");
            }
        }
    });

    // Bind server
    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    println!("Tally server listening on http://{local_addr}");
    println!();
    println!("Available endpoints:");
    println!("  POST /api/auth/login          - Log in, sets the session cookie");
    println!("  POST /api/auth/register       - Self-register as delegate or witness");
    println!("  POST /api/auth/logout         - End the current session");
    println!("  GET  /api/me                  - Current authorization context");
    println!("  GET  /api/live                - Live update stream (server-sent events)");
    println!("  GET  /api/commitments         - Commitments in scope");
    println!("  POST /api/commitments         - Record a commitment (admin, leader)");
    println!("  POST /api/commitments/{{id}}/status - Change status (admin, leader)");
    println!("  POST /api/alerts              - Broadcast an alert (admin)");
    println!("  GET  /health                  - Health check");
    println!();
    println!("Press Ctrl+C to shutdown");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
            _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
        }
    };

    web::serve(listener, state, shutdown).await?;
    purge_task.abort();

    println!("Server shut down");
    Ok(())
}
