//! # marksync model
//!
//! Shared domain and protocol types for the personal cloud sync engine:
//!
//! - The device-local and canonical schema registries
//! - Change-log entries and the per-user logical clock they carry
//! - The `download_client_updates` request/batch contract
//! - Annotation privacy levels
//! - Readwise highlight payloads and their formatting rules
//!
//! ## Key invariants
//!
//! - A `Delete` change-log entry always carries `info` describing the
//!   natural key of the removed object (the object itself is gone)
//! - Change-log sequence numbers are strictly increasing per user
//! - Overwrite/Delete download instructions are idempotent to apply

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod clock;
mod collections;
mod download;
mod privacy;
mod readwise;
mod session;

pub use change::{ChangeLogEntry, ChangeType};
pub use clock::{Clock, SystemClock};
pub use collections::{
    canonical_registry, local_registry, canonical, local, shared, SchemaVersion,
    CURRENT_SCHEMA_VERSION, LOCATORS_SINCE_VERSION, SYNCED_COLLECTIONS,
};
pub use download::{ClientInstruction, DownloadRequest, UpdateBatch};
pub use privacy::PrivacyLevel;
pub use readwise::{
    format_highlight_note, format_highlight_tag, format_highlight_time, iso8601_millis,
    ReadwiseHighlight, READWISE_HIGHLIGHTS_URL,
};
pub use session::{DeviceId, Session, UserId};
