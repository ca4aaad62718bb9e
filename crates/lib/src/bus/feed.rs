//! Server-sent event framing for the live dashboard feed.
//!
//! A [`LiveFeed`] is one client's view of the [`UpdateBus`]: a `ready` frame
//! first, then every update published while the feed is open. Heartbeats are
//! produced by the HTTP layer's keep-alive, not by the feed itself.

use axum::response::sse::Event;
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::mpsc;

use super::{SubscriberError, Subscription, UpdateBus, UpdateEvent};
use crate::Clock;

/// Comment text of a heartbeat frame. The interval is `FeedPolicy::heartbeat`.
pub const HEARTBEAT_TEXT: &str = "ping";

#[derive(Serialize)]
struct ReadyPayload {
    ts: i64,
}

/// A named frame on the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedMessage {
    /// Sent once when the feed opens.
    Ready { ts: i64 },
    Update(UpdateEvent),
}

impl FeedMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            FeedMessage::Ready { .. } => "ready",
            FeedMessage::Update(_) => "update",
        }
    }

    /// The JSON body of the `data:` line.
    pub fn data(&self) -> serde_json::Result<String> {
        match self {
            FeedMessage::Ready { ts } => serde_json::to_string(&ReadyPayload { ts: *ts }),
            FeedMessage::Update(event) => serde_json::to_string(event),
        }
    }

    pub fn to_sse_event(&self) -> Event {
        let event = Event::default().event(self.event_name());
        match self.data() {
            Ok(data) => event.data(data),
            // Unreachable for these payloads.
            Err(e) => {
                tracing::error!("failed to encode feed frame: {e}");
                event.data("{}")
            }
        }
    }
}

/// One client's subscription to the bus, buffered through an unbounded channel.
///
/// Dropping the feed unsubscribes it.
pub struct LiveFeed {
    ready: Option<i64>,
    rx: mpsc::UnboundedReceiver<UpdateEvent>,
    subscription: Subscription,
}

impl LiveFeed {
    /// Subscribe to `bus`. The ready frame carries the clock's time at this call.
    pub fn open(bus: &UpdateBus, clock: &dyn Clock) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(move |event| {
            tx.send(event.clone())
                .map_err(|_| SubscriberError::Disconnected)
        });
        tracing::debug!(subscriber = subscription.id(), "live feed opened");
        Self {
            ready: Some(clock.now_millis()),
            rx,
            subscription,
        }
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription.id()
    }

    pub fn is_open(&self) -> bool {
        self.subscription.is_active()
    }

    /// Next frame, or `None` once the feed is closed and drained.
    pub async fn next(&mut self) -> Option<FeedMessage> {
        if let Some(ts) = self.ready.take() {
            return Some(FeedMessage::Ready { ts });
        }
        self.rx.recv().await.map(FeedMessage::Update)
    }

    /// Stop receiving new events. Already buffered events are still yielded.
    pub fn close(&mut self) {
        self.subscription.unsubscribe();
        self.rx.close();
    }

    pub fn into_stream(self) -> impl Stream<Item = FeedMessage> + Send + 'static {
        futures_util::stream::unfold(self, |mut feed| async move {
            feed.next().await.map(|message| (message, feed))
        })
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if self.subscription.is_active() {
            tracing::debug!(subscriber = self.subscription.id(), "live feed closed");
        }
    }
}
