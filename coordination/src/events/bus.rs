//! Event bus for turn transitions
//!
//! Pub/sub over a Tokio broadcast channel. Publishing is best-effort: it
//! never blocks and never fails the routing loop. Slow subscribers lag and
//! lose the oldest events rather than applying backpressure.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::TurnEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Destination for turn events
pub trait EventSink: Send + Sync {
    /// Emit an event without blocking
    fn emit(&self, event: TurnEvent);
}

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast event bus
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TurnEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: TurnEvent) {
        let event_type = event.event_type;
        match self.sender.send(event) {
            Ok(count) => debug!(%event_type, receivers = count, "Event published"),
            // No receivers is fine
            Err(_) => debug!(%event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: TurnEvent) {
        self.publish(event);
    }
}
