//! Translation error taxonomy.

use marksync_storage::StorageError;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while translating between the local and canonical
/// schemas.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// A local object references something that has no canonical
    /// counterpart, e.g. an annotation for a page that was never
    /// uploaded.
    #[error("unresolved reference from {collection}.{field} = {value}")]
    UnresolvedReference {
        /// The local collection holding the reference.
        collection: String,
        /// The referencing field.
        field: String,
        /// The value that failed to resolve.
        value: Value,
    },

    /// A canonical row cannot be deleted because dependent rows still
    /// reference it and the mutation did not cascade over them.
    #[error("cannot delete from {collection}: dependent rows exist in {dependent}")]
    DependentsExist {
        /// The collection the delete targeted.
        collection: String,
        /// The collection holding the surviving dependents.
        dependent: String,
    },

    /// A local object is missing a field the translation needs.
    #[error("{collection} object is missing required field {field}")]
    MissingField {
        /// The local collection.
        collection: String,
        /// The missing field.
        field: String,
    },

    /// The mutation targets a collection with no translation rule.
    #[error("no translation rule for collection {0}")]
    UnsupportedCollection(String),

    /// The underlying store rejected a read or write.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TranslationError {
    /// Returns true when the failed mutation can be skipped without
    /// corrupting canonical state.
    ///
    /// Unresolvable references and unknown collections describe stale or
    /// foreign input and are logged and dropped; everything else aborts
    /// the push so the client can retry it.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            TranslationError::UnresolvedReference { .. }
                | TranslationError::MissingField { .. }
                | TranslationError::UnsupportedCollection(_)
        )
    }
}

/// Convenience alias used throughout the translation layer.
pub type TranslationResult<T> = Result<T, TranslationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn skippable_classification() {
        let unresolved = TranslationError::UnresolvedReference {
            collection: "annotations".into(),
            field: "page_url".into(),
            value: json!("a.com"),
        };
        assert!(unresolved.is_skippable());

        let dependents = TranslationError::DependentsExist {
            collection: "pages".into(),
            dependent: "personal_annotation".into(),
        };
        assert!(!dependents.is_skippable());
    }
}
