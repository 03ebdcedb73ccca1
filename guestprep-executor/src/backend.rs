//! Collaborator traits the provisioning pipeline drives.
//!
//! The hypervisor control tool and the remote shell are both opaque to the
//! pipeline; swapping `vmrun` for another tool, or `ssh` for a library
//! client, does not touch the stage logic.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use guestprep_core::{Credentials, SnapshotName};

use crate::{ExecutorError, GuestHandle};

/// Whether the guest gets a graphical console when started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    /// No console window.
    #[default]
    Headless,
    /// Attach a graphical console.
    Gui,
}

impl DisplayMode {
    /// Map the `--gui` flag onto a display mode.
    #[must_use]
    pub fn from_interactive(interactive: bool) -> Self {
        if interactive {
            Self::Gui
        } else {
            Self::Headless
        }
    }
}

/// Hypervisor control interface.
///
/// Every method blocks until the underlying operation completes and maps a
/// non-zero outcome to [`ExecutorError::Provisioning`].
///
/// # Cancel Safety
/// Implementations must tolerate their futures being dropped: the pipeline
/// races each call against a cancellation token.
#[async_trait]
pub trait HypervisorControl: Send + Sync {
    /// Control tool this backend shells out to, checked before any call.
    fn control_tool(&self) -> &Path;

    /// Snapshot names currently recorded for `guest`.
    async fn list_snapshots(
        &self,
        guest: &GuestHandle,
    ) -> Result<BTreeSet<SnapshotName>, ExecutorError>;

    /// Capture the guest's current state under `name`.
    async fn create_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError>;

    /// Create a linked clone of `base` from `parent` at `target`.
    async fn linked_clone(
        &self,
        base: &GuestHandle,
        parent: &SnapshotName,
        target: &Path,
        target_name: &str,
    ) -> Result<GuestHandle, ExecutorError>;

    /// Discard the guest's current state and return to `name`.
    async fn revert_to_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError>;

    /// Power the guest on.
    async fn start(&self, guest: &GuestHandle, mode: DisplayMode) -> Result<(), ExecutorError>;

    /// Ask the guest-integration layer for the guest's address.
    ///
    /// Waiting for the in-guest agent is the implementation's job. `Ok(None)`
    /// means the layer answered without an address.
    async fn guest_address(&self, guest: &GuestHandle) -> Result<Option<IpAddr>, ExecutorError>;
}

/// Remote command execution against a booted guest.
///
/// Each call opens a fresh session, authenticates, runs `command`, and
/// returns its exit status.
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Local binaries every session spawns. Empty for in-process clients.
    fn required_tools(&self) -> Vec<&Path> {
        Vec::new()
    }

    /// Run `command` on `host` as `credentials.username`.
    ///
    /// # Errors
    /// Returns an error when no session could be established at all.
    async fn run(
        &self,
        host: IpAddr,
        credentials: &Credentials,
        command: &str,
    ) -> Result<i32, ExecutorError>;
}
