//! # marksync storage
//!
//! Generic record store used by both sides of the sync engine: the
//! denormalized per-device store and the normalized canonical store.
//!
//! This crate provides:
//! - Collection definitions with field metadata, primary keys, and
//!   declared relationship edges
//! - An in-memory store with CRUD by object or where-pattern
//! - An ordered list of post-commit handlers invoked for every committed
//!   mutation, each returning a structured outcome
//!
//! ## Key invariants
//!
//! - Handlers observe only committed mutations, in commit order
//! - `create` returns the generated id synchronously for auto-id
//!   collections
//! - Unknown collections and fields are rejected, never silently stored

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod handlers;
mod memory;
mod pattern;
mod schema;

pub use error::{StorageError, StorageResult};
pub use handlers::{HandlerOutcome, Mutation, MutationOp, PostCommitHandler};
pub use memory::{MemoryStore, StoreSnapshot};
pub use pattern::{matches_pattern, WherePattern};
pub use schema::{CollectionDef, FieldDef, FieldType, PrimaryKey, Registry, Relationship};

/// A stored record: a map of field name to JSON value.
pub type Object = serde_json::Map<String, serde_json::Value>;

/// Re-exported value type used for all stored fields.
pub use serde_json::Value;

/// Builds an [`Object`] from `(key, value)` pairs.
///
/// Convenience for call sites and tests that assemble records inline.
pub fn object<I, K>(pairs: I) -> Object
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
