//! Device-side failure types.

use marksync_server::ServerError;
use marksync_storage::StorageError;
use thiserror::Error;

/// A failure in the device sync runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The local store rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The cloud side rejected the request.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// The transport to the cloud failed; the request may be repeated.
    #[error("backend unreachable: {0}")]
    Backend(String),
    /// Push retries are exhausted; the batch stays queued and the
    /// engine reports a terminal failure in its status.
    #[error("sync halted: {0}")]
    Halted(String),
}

impl EngineError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Backend(_))
    }
}

/// Shorthand for engine results.
pub type EngineResult<T> = Result<T, EngineError>;
