//! # marksync translation
//!
//! The translation layer between the denormalized device-local schema
//! and the normalized, user-scoped canonical schema.
//!
//! Upload direction: captured local mutations become canonical writes
//! through [`translate_upload`], with every loud write paired 1:1 with
//! a change-log entry via [`CanonicalWriter`] and a [`ChangeSink`].
//!
//! Download direction: [`download_client_updates`] compiles the
//! change-log tail back into idempotent local instructions, re-reading
//! canonical state so stale entries drop out naturally.
//!
//! The mapping itself is a static table ([`SchemaMap`]) validated for
//! completeness at startup; collections with extra semantics (content
//! deduplication, tag garbage collection, selector splitting) have
//! dedicated translators behind the same dispatch.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod annotations;
mod content;
mod download;
mod error;
mod fields;
mod map;
mod sink;
mod tags;
mod upload;
mod writer;

pub use download::download_client_updates;
pub use error::{TranslationError, TranslationResult};
pub use map::{MappedRule, RefEdge, RefTarget, SchemaMap, TranslationRule, MAPPED_RULES};
pub use sink::{ChangeSink, RecordingSink};
pub use upload::translate_upload;
pub use writer::{unresolved, CanonicalWriter};
