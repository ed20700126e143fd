//! Server-side failure types.

use marksync_storage::StorageError;
use marksync_translation::TranslationError;
use thiserror::Error;

/// A failure while handling an upload or download.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The canonical store rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Upload translation failed and could not be skipped.
    #[error(transparent)]
    Translation(#[from] TranslationError),
}

/// Shorthand for server results.
pub type ServerResult<T> = Result<T, ServerError>;
