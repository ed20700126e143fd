//! # marksync testkit
//!
//! Test utilities for the sync engine:
//! - [`clock::TestClock`], a clock that moves only when told to
//! - [`data`], canned local-shape objects
//! - [`generators`], proptest strategies for lifecycle sequences
//! - [`harness::SyncHarness`], N devices over one in-process hub

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod data;
pub mod generators;
pub mod harness;

pub use clock::TestClock;
pub use harness::{SyncHarness, DEFAULT_USER};
