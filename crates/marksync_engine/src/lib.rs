//! # marksync engine
//!
//! The device-side sync runtime. Each device owns a local store in the
//! denormalized schema; committed writes to synced collections are
//! captured into an [`Outbox`] and pushed to the cloud, and remote
//! changes are pulled as idempotent instructions and applied silently,
//! so nothing a device downloads is ever echoed back up.
//!
//! The cloud sits behind the [`CloudBackend`] trait;
//! [`LoopbackBackend`] wires an in-process hub for tests and
//! single-process deployments.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod engine;
mod error;
mod outbox;
mod settings;

pub use backend::{CloudBackend, LoopbackBackend};
pub use config::{RetryConfig, SyncConfig};
pub use engine::{PersonalCloudEngine, SyncStatus};
pub use error::{EngineError, EngineResult};
pub use outbox::{ChangeCapture, Outbox};
pub use settings::{DeviceSettings, READWISE_API_KEY_SETTING};
