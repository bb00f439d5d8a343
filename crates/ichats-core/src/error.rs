use thiserror::Error;

use crate::store::StoreError;

/// Failures of the realtime layer. None of them is fatal to the process and
/// none of them touches state owned by other connections.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// A call invite named a user with no live connection. Chat sends never
    /// produce this; they fall back to offline storage.
    #[error("target {0} is not connected")]
    TargetUnreachable(String),
}
