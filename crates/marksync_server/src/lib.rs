//! # marksync server
//!
//! The canonical side of the sync engine: a per-user append-only
//! [`ChangeLog`] and the [`CloudHub`] that owns canonical storage,
//! runs upload translation, serves `download_client_updates`, and
//! dispatches the sharing and Readwise hooks.
//!
//! One hub serves every device of every user; a per-hub write lock
//! keeps canonical writes, log entries, and hook side effects in a
//! single observable commit order.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod hub;
mod log;

pub use error::{ServerError, ServerResult};
pub use hub::{CloudHub, ConflictPolicy, PushOutcome};
pub use log::ChangeLog;
