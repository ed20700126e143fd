//! Post-commit mutation events and handlers.
//!
//! Every committed store mutation is described by a [`Mutation`] and
//! handed, in registration order, to each registered
//! [`PostCommitHandler`]. Handlers return a structured
//! [`HandlerOutcome`] instead of emitting fire-and-forget events, so the
//! caller can distinguish success from retryable and fatal failures.

use crate::pattern::WherePattern;
use crate::Object;

/// The kind of committed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    /// A row was created.
    Create,
    /// An existing row was modified.
    Update,
    /// One or more rows were deleted.
    Delete,
}

/// A committed store mutation, as observed by post-commit handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// The collection that changed.
    pub collection: String,
    /// The kind of change.
    pub op: MutationOp,
    /// The row after the change (for Create/Update).
    pub object: Option<Object>,
    /// The match pattern of the change (for Update/Delete).
    pub where_: Option<WherePattern>,
    /// The rows removed by a delete; handlers that need the dead rows'
    /// fields read them here, as the store no longer has them.
    pub removed: Vec<Object>,
}

impl Mutation {
    /// Describes a committed create.
    pub fn create(collection: impl Into<String>, object: Object) -> Self {
        Self {
            collection: collection.into(),
            op: MutationOp::Create,
            object: Some(object),
            where_: None,
            removed: Vec::new(),
        }
    }

    /// Describes a committed update.
    pub fn update(collection: impl Into<String>, where_: WherePattern, object: Object) -> Self {
        Self {
            collection: collection.into(),
            op: MutationOp::Update,
            object: Some(object),
            where_: Some(where_),
            removed: Vec::new(),
        }
    }

    /// Describes a committed delete.
    pub fn delete(collection: impl Into<String>, where_: WherePattern) -> Self {
        Self {
            collection: collection.into(),
            op: MutationOp::Delete,
            object: None,
            where_: Some(where_),
            removed: Vec::new(),
        }
    }

    /// Attaches the rows a delete removed.
    pub fn with_removed(mut self, removed: Vec<Object>) -> Self {
        self.removed = removed;
        self
    }
}

/// The structured result of handling one mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler processed the mutation.
    Done,
    /// A transient failure; the invocation may be repeated.
    Retry(String),
    /// A permanent failure; retrying cannot help.
    Fatal(String),
}

/// A handler invoked synchronously after each committed mutation.
///
/// Handlers run in registration order within the same logical commit,
/// before control returns to the mutating caller.
pub trait PostCommitHandler: Send + Sync {
    /// Handles one committed mutation.
    fn handle(&self, mutation: &Mutation) -> HandlerOutcome;
}

impl<F> PostCommitHandler for F
where
    F: Fn(&Mutation) -> HandlerOutcome + Send + Sync,
{
    fn handle(&self, mutation: &Mutation) -> HandlerOutcome {
        self(mutation)
    }
}
