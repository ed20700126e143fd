//! # marksync hooks
//!
//! Post-commit reactions to canonical writes.
//!
//! The translation layer writes per-user canonical rows; everything
//! that must happen *because* of those writes lives here, registered as
//! [`marksync_storage::PostCommitHandler`]s on the canonical store:
//!
//! - [`SharingHook`] projects personal share state into the cross-user
//!   `shared_*` collections and maintains followed-list rows.
//! - [`ReadwiseHook`] queues highlight-export actions, drained later by
//!   a [`ReadwiseWorker`].
//!
//! Hooks run synchronously inside the commit, in registration order,
//! and report structured outcomes back to the committing caller.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod context;
mod error;
pub mod followed;
mod readwise;
mod sharing;

pub use context::HookContext;
pub use error::{HookError, HookResult, ReadwiseError};
pub use readwise::{
    ReadwiseClient, ReadwiseHook, ReadwiseWorker, RecordingReadwiseClient,
    READWISE_API_KEY_SETTING,
};
pub use sharing::SharingHook;
