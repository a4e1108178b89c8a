//! Broadcast sink for external observers (UI, logs).
//!
//! Publishing is fire-and-forget: the runtime never waits on observers and
//! behaves identically when nobody is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// One published event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastEvent {
    /// e.g. "agent_stream", "agent_completed", "subagent_status"
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// A fire-and-forget event sink.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, event_type: &str, payload: serde_json::Value);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBroadcaster;

impl Broadcaster for NoopBroadcaster {
    fn publish(&self, _event_type: &str, _payload: serde_json::Value) {}
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Slow
/// subscribers lag and drop events instead of blocking publishers.
pub struct EventBus {
    sender: broadcast::Sender<Arc<BroadcastEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastEvent>> {
        self.sender.subscribe()
    }
}

impl Broadcaster for EventBus {
    fn publish(&self, event_type: &str, payload: serde_json::Value) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(BroadcastEvent {
            event_type: event_type.to_string(),
            payload,
            timestamp: Utc::now(),
        }));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
