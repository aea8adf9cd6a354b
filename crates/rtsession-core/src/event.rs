//! Session lifecycle events and their broadcast hub.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::{
    BackendError, Session,
    message::{TopicMessage, UserPresence},
};

/// Default broadcast capacity.
const EVENT_CAPACITY: usize = 256;

/// Why the session ended for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The caller disconnected on purpose.
    Intentional,
    /// Reconnect attempts ran out.
    Exhausted,
    /// Re-authentication during a reconnect was refused.
    Rejected,
}

/// Event published to UI subscribers from the host loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Socket connected with this session.
    Connected { session: Session },
    /// No further automatic reconnect will happen.
    Disconnected { reason: TerminalReason },
    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Error surfaced to the UI.
    Error { error: BackendError },
    /// Presence change on a topic.
    Presence {
        topic: String,
        joins: Vec<UserPresence>,
        leaves: Vec<UserPresence>,
    },
    /// Incoming chat message.
    Message { message: TopicMessage },
}

/// Broadcast hub for [`SessionEvent`]s.
///
/// Publishing with no subscribers is not an error; the event is dropped.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<SessionEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CAPACITY)
    }

    /// Create a hub whose slow subscribers lag after `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every live subscriber.
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Get a receiver for future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Stream of future events. Lagged gaps are skipped.
    #[must_use]
    pub fn stream(&self) -> futures::stream::BoxStream<'static, SessionEvent> {
        BroadcastStream::new(self.subscribe())
            .filter_map(|res| async move {
                match res {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("Event subscriber lagged: {e}");
                        None
                    }
                }
            })
            .boxed()
    }
}
