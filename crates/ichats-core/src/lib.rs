pub mod auth;
pub mod error;
pub mod events;
pub mod presence;
pub mod relay;
pub mod replay;
pub mod signaling;
pub mod store;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use presence::PresenceRegistry;
use store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MessageStore>,
    pub presence: Arc<PresenceRegistry>,
    pub config: AppConfig,
    /// Open realtime connections, counted from handshake acceptance so the
    /// cap also covers sockets that have not registered presence yet.
    pub gateway_connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, config: AppConfig) -> Self {
        Self {
            store,
            presence: Arc::new(PresenceRegistry::new()),
            config,
            gateway_connections: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    /// Reject malformed `sendMessage` payloads instead of filling defaults.
    pub strict_payloads: bool,
    /// Upper bound on concurrently open realtime connections.
    pub max_connections: usize,
    pub ping_interval_seconds: u64,
    /// A connection that sends nothing (not even a pong) for this long is
    /// closed and taken offline.
    pub heartbeat_timeout_seconds: u64,
    /// Log every realtime frame under the `wire` target.
    pub wire_trace: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            strict_payloads: false,
            max_connections: 2_000,
            ping_interval_seconds: 20,
            heartbeat_timeout_seconds: 60,
            wire_trace: false,
        }
    }
}
