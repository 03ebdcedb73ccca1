//! Core types for provisioning a clean CI guest.
//!
//! Defines the deterministic clone identity, snapshot names, login
//! credentials, the readiness polling budget, and the pure branch decisions
//! the provisioning pipeline is built from.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod decision;
pub mod error;
pub mod id;
pub mod policy;

pub use decision::{
    choose_restore_branch, should_clone, should_create_snapshot, snapshot_exists, RestoreBranch,
};
pub use error::CoreError;
pub use id::{CloneIdentity, ConcurrencySlot, RunnerId, SnapshotName};
pub use policy::{Credentials, PollingPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL};
