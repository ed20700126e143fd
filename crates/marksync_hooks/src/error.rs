//! Hook and delivery failure types.

use marksync_storage::StorageError;
use marksync_translation::TranslationError;
use thiserror::Error;

/// A failure while talking to the Readwise API.
#[derive(Debug, Error)]
pub enum ReadwiseError {
    /// Readwise rejected the stored API key.
    #[error("readwise rejected the API key")]
    Unauthorized,
    /// The request did not complete; the action stays queued.
    #[error("readwise request failed: {0}")]
    Http(String),
}

impl ReadwiseError {
    /// Whether a later delivery attempt could succeed unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReadwiseError::Http(_))
    }
}

/// A failure inside a hook or the Readwise delivery worker.
#[derive(Debug, Error)]
pub enum HookError {
    /// The canonical store rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A canonical write could not be translated.
    #[error(transparent)]
    Translation(#[from] TranslationError),
    /// Readwise delivery failed.
    #[error(transparent)]
    Readwise(#[from] ReadwiseError),
}

/// Shorthand for hook results.
pub type HookResult<T> = Result<T, HookError>;
