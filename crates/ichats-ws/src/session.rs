use ichats_core::auth::Identity;
use tokio::time::Instant;

/// Per-connection bookkeeping owned by the session loop.
pub struct Session {
    pub connection_id: String,
    pub identity: Identity,
    pub connected_at: Instant,
    pub frames_in: u64,
    pub frames_out: u64,
}

impl Session {
    pub fn new(identity: Identity) -> Self {
        Self {
            connection_id: uuid::Uuid::new_v4().to_string(),
            identity,
            connected_at: Instant::now(),
            frames_in: 0,
            frames_out: 0,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }
}
