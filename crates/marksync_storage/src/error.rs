//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The collection is not declared in the registry.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// A field is not declared on the collection.
    #[error("unknown field `{field}` on collection `{collection}`")]
    UnknownField {
        /// Collection name.
        collection: String,
        /// Offending field name.
        field: String,
    },

    /// A required field is missing from an object.
    #[error("missing field `{field}` on collection `{collection}`")]
    MissingField {
        /// Collection name.
        collection: String,
        /// Missing field name.
        field: String,
    },

    /// A relationship declaration references an unknown collection.
    #[error("relationship `{field}` on `{collection}` targets unknown collection `{target}`")]
    InvalidRelationship {
        /// Collection carrying the relationship.
        collection: String,
        /// Relationship field.
        field: String,
        /// Undeclared target collection.
        target: String,
    },

    /// No row matched a pattern that was required to match.
    #[error("no row in `{collection}` matches the given pattern")]
    NotFound {
        /// Collection name.
        collection: String,
    },

    /// A post-commit handler reported a fatal outcome.
    #[error("post-commit handler failed: {0}")]
    HandlerFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::UnknownCollection("ghosts".into());
        assert_eq!(err.to_string(), "unknown collection: ghosts");

        let err = StorageError::UnknownField {
            collection: "pages".into(),
            field: "zap".into(),
        };
        assert!(err.to_string().contains("zap"));
        assert!(err.to_string().contains("pages"));
    }
}
