use ichats_models::gateway::GatewayMessage;
use serde::Serialize;
use tokio::sync::mpsc;

/// One outbound frame queued for a single connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl ServerEvent {
    pub fn new(event_type: &str, payload: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
        }
    }

    /// Helper: build an event from any serializable payload.
    pub fn typed<T: Serialize>(event_type: &str, payload: &T) -> Self {
        let payload = serde_json::to_value(payload).unwrap_or_else(|e| {
            tracing::error!(event_type, "failed to serialize event payload: {}", e);
            serde_json::Value::Null
        });
        Self::new(event_type, payload)
    }

    pub fn into_frame(self) -> GatewayMessage {
        GatewayMessage::new(&self.event_type, self.payload)
    }
}

/// Per-connection outbound queue. Unbounded so that enqueueing never blocks
/// while the presence table lock is held.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<ServerEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Queued frames at which a connection is reported as a slow reader.
pub const QUEUE_DEPTH_WARN: usize = 1_000;

/// Reports a backlogged queue once per episode: after a warning it stays
/// quiet until the queue drains to half the threshold.
#[derive(Debug, Default)]
pub struct QueueDepthMonitor {
    backlogged: bool,
}

impl QueueDepthMonitor {
    /// Returns true when `depth` has just crossed [`QUEUE_DEPTH_WARN`].
    pub fn observe(&mut self, depth: usize) -> bool {
        if depth >= QUEUE_DEPTH_WARN {
            let crossed = !self.backlogged;
            self.backlogged = true;
            return crossed;
        }
        if depth <= QUEUE_DEPTH_WARN / 2 {
            self.backlogged = false;
        }
        false
    }
}
