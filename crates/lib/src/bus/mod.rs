//! Live update bus
//!
//! In-process publish/subscribe between the code paths that change dashboard
//! state and the connections watching it. The bus is an explicit value held in
//! application state; cloning it shares the same subscriber list.
//!
//! Delivery is synchronous, in registration order, best effort and
//! at-most-once per live subscriber. Nothing is buffered for late joiners.
//! Running several server processes needs an external broker with one local
//! re-publisher per process; this type does not fan out across processes.

pub mod feed;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

pub use feed::{FeedMessage, LiveFeed};

/// Category of a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
    Report,
    Commitment,
    Task,
    Communication,
    Alert,
}

/// Notification that something on the dashboard changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateEvent {
    /// Epoch milliseconds
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<UpdateKind>,
}

impl UpdateEvent {
    pub fn new(ts: i64) -> Self {
        Self {
            ts,
            source: None,
            kind: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_kind(mut self, kind: UpdateKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Why a subscriber refused an event. Never stops delivery to the others.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("subscriber disconnected")]
    Disconnected,

    #[error("subscriber failed: {reason}")]
    Failed { reason: String },
}

type Callback = Arc<dyn Fn(&UpdateEvent) -> Result<(), SubscriberError> + Send + Sync>;

struct Registration {
    id: u64,
    callback: Callback,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<Registration>>,
    /// Serialises publishes so every subscriber sees one global order.
    delivery: Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking subscriber never runs under these locks, so poison carries no torn state.
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide publish/subscribe channel for [`UpdateEvent`]s.
#[derive(Clone, Default)]
pub struct UpdateBus {
    inner: Arc<BusInner>,
}

impl UpdateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Registering the same closure twice yields two deliveries.
    ///
    /// The returned [`Subscription`] removes the callback when unsubscribed or dropped.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&UpdateEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.subscribers).push(Registration {
            id,
            callback: Arc::new(callback),
        });
        tracing::debug!(subscriber = id, "bus subscriber added");
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            active: AtomicBool::new(true),
        }
    }

    /// Deliver `event` to every current subscriber, in registration order.
    ///
    /// Returns how many subscribers accepted it. Callbacks must not publish
    /// from inside their own delivery.
    pub fn publish(&self, event: &UpdateEvent) -> usize {
        let _order = lock(&self.inner.delivery);
        let snapshot: Vec<(u64, Callback)> = lock(&self.inner.subscribers)
            .iter()
            .map(|r| (r.id, Arc::clone(&r.callback)))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(SubscriberError::Disconnected)) => {
                    tracing::debug!(subscriber = id, "subscriber already disconnected");
                }
                Ok(Err(e)) => tracing::warn!(subscriber = id, "{e}"),
                Err(_) => tracing::error!(subscriber = id, "subscriber panicked during delivery"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// Handle for one registration on an [`UpdateBus`].
///
/// Unsubscribing is idempotent and also happens on drop, so teardown runs
/// exactly once whichever path ends the subscriber's life.
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
    active: AtomicBool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(inner) = self.bus.upgrade() {
            lock(&inner.subscribers).retain(|r| r.id != self.id);
            tracing::debug!(subscriber = self.id, "bus subscriber removed");
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
