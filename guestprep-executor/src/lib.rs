//! Guest provisioning for CI jobs.
//!
//! Turns a base guest image into a running, freshly reverted, SSH-reachable
//! linked clone through idempotent snapshot/clone/restore stages, a boot
//! wait, and a bounded readiness poll.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod boot;
mod cancel;
pub mod config;
pub mod ensure;
pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod preflight;
pub mod readiness;
pub mod ssh;
pub mod vmrun;

#[cfg(test)]
mod fake;

pub use backend::{DisplayMode, HypervisorControl, RemoteShell};
pub use config::ProvisionConfig;
pub use ensure::{CloneOutcome, SnapshotOutcome};
pub use error::{ExecutorError, FailureKind, Operation};
pub use handle::GuestHandle;
pub use orchestrator::{PreparedGuest, Provisioner};
pub use readiness::PROBE_COMMAND;
pub use ssh::SshCommandShell;
pub use vmrun::{VmrunBackend, DEFAULT_VMRUN_PATH};
