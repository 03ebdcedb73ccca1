//! VMware `vmrun` hypervisor backend.
//!
//! Drives VMware Fusion (or Workstation, via the host type) through its
//! command-line control tool. Every operation is one `vmrun` invocation;
//! a non-zero exit is a provisioning failure.

use std::collections::BTreeSet;
use std::ffi::{OsStr, OsString};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use guestprep_core::SnapshotName;
use tokio::process::Command;

use crate::error::Operation;
use crate::{DisplayMode, ExecutorError, GuestHandle, HypervisorControl};

/// Where VMware Fusion installs `vmrun`.
pub const DEFAULT_VMRUN_PATH: &str =
    "/Applications/VMware Fusion.app/Contents/Library/vmrun";

/// `vmrun` backend.
#[derive(Debug, Clone)]
pub struct VmrunBackend {
    /// Path to the `vmrun` binary.
    tool_path: PathBuf,

    /// Value passed to `-T` (`fusion`, `ws`, `player`).
    host_type: String,
}

impl VmrunBackend {
    /// Create a backend for VMware Fusion using the given tool path.
    #[must_use]
    pub fn new(tool_path: PathBuf) -> Self {
        Self::with_host_type(tool_path, "fusion")
    }

    /// Create a backend for an explicit `vmrun -T` host type.
    #[must_use]
    pub fn with_host_type(tool_path: PathBuf, host_type: impl Into<String>) -> Self {
        Self {
            tool_path,
            host_type: host_type.into(),
        }
    }

    /// Run one `vmrun` command and return its stdout.
    async fn invoke(
        &self,
        operation: Operation,
        guest: &Path,
        args: &[&OsStr],
    ) -> Result<String, ExecutorError> {
        tracing::debug!(
            tool = %self.tool_path.display(),
            %operation,
            args = ?args,
            "invoking vmrun"
        );

        let output = Command::new(&self.tool_path)
            .arg("-T")
            .arg(&self.host_type)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ExecutorError::provisioning(
                    operation,
                    guest,
                    format!("exec {}: {e}", self.tool_path.display()),
                )
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        // vmrun reports most errors on stdout as "Error: ...".
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = [stdout.trim(), stderr.trim()]
            .into_iter()
            .find(|s| !s.is_empty())
            .unwrap_or("no output");
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_owned(), |c| c.to_string());

        Err(ExecutorError::provisioning(
            operation,
            guest,
            format!("vmrun exited with {code}: {detail}"),
        ))
    }
}

#[async_trait]
impl HypervisorControl for VmrunBackend {
    fn control_tool(&self) -> &Path {
        &self.tool_path
    }

    async fn list_snapshots(
        &self,
        guest: &GuestHandle,
    ) -> Result<BTreeSet<SnapshotName>, ExecutorError> {
        let stdout = self
            .invoke(
                Operation::ListSnapshots,
                &guest.image_path,
                &[OsStr::new("listSnapshots"), guest.image_path.as_os_str()],
            )
            .await?;
        Ok(parse_snapshot_list(&stdout))
    }

    async fn create_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError> {
        self.invoke(
            Operation::CreateSnapshot,
            &guest.image_path,
            &[
                OsStr::new("snapshot"),
                guest.image_path.as_os_str(),
                OsStr::new(name.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn linked_clone(
        &self,
        base: &GuestHandle,
        parent: &SnapshotName,
        target: &Path,
        target_name: &str,
    ) -> Result<GuestHandle, ExecutorError> {
        if let Some(dir) = target.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                ExecutorError::provisioning(
                    Operation::Clone,
                    target,
                    format!("create {}: {e}", dir.display()),
                )
            })?;
        }

        let snapshot_arg = OsString::from(format!("-snapshot={parent}"));
        let name_arg = OsString::from(format!("-cloneName={target_name}"));
        self.invoke(
            Operation::Clone,
            &base.image_path,
            &[
                OsStr::new("clone"),
                base.image_path.as_os_str(),
                target.as_os_str(),
                OsStr::new("linked"),
                &snapshot_arg,
                &name_arg,
            ],
        )
        .await?;

        Ok(GuestHandle::attach(target))
    }

    async fn revert_to_snapshot(
        &self,
        guest: &GuestHandle,
        name: &SnapshotName,
    ) -> Result<(), ExecutorError> {
        self.invoke(
            Operation::Revert,
            &guest.image_path,
            &[
                OsStr::new("revertToSnapshot"),
                guest.image_path.as_os_str(),
                OsStr::new(name.as_str()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn start(&self, guest: &GuestHandle, mode: DisplayMode) -> Result<(), ExecutorError> {
        let mode = match mode {
            DisplayMode::Gui => "gui",
            DisplayMode::Headless => "nogui",
        };
        self.invoke(
            Operation::Start,
            &guest.image_path,
            &[OsStr::new("start"), guest.image_path.as_os_str(), OsStr::new(mode)],
        )
        .await?;
        Ok(())
    }

    async fn guest_address(&self, guest: &GuestHandle) -> Result<Option<IpAddr>, ExecutorError> {
        // -wait blocks until VMware Tools in the guest reports an address.
        let stdout = self
            .invoke(
                Operation::GuestAddress,
                &guest.image_path,
                &[
                    OsStr::new("getGuestIPAddress"),
                    guest.image_path.as_os_str(),
                    OsStr::new("-wait"),
                ],
            )
            .await?;
        Ok(parse_guest_address(&stdout))
    }
}

/// Parse `vmrun listSnapshots` output.
///
/// The first line is a `Total snapshots: N` header; every following
/// non-blank line is one snapshot name.
#[must_use]
pub fn parse_snapshot_list(stdout: &str) -> BTreeSet<SnapshotName> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("Total snapshots:"))
        .filter_map(|line| SnapshotName::new(line).ok())
        .collect()
}

/// Parse `vmrun getGuestIPAddress` output into an address.
#[must_use]
pub fn parse_guest_address(stdout: &str) -> Option<IpAddr> {
    stdout.lines().map(str::trim).find(|l| !l.is_empty())?.parse().ok()
}

/// Verify a binary exists either at the given path or in PATH.
///
/// # Errors
/// Returns [`ExecutorError::Precondition`] if the binary cannot be found.
pub fn which_binary(path: &Path) -> Result<PathBuf, ExecutorError> {
    if path.is_absolute() || path.components().count() > 1 {
        if path.exists() {
            return Ok(path.to_owned());
        }
        return Err(ExecutorError::Precondition {
            reason: format!("{} does not exist", path.display()),
        });
    }

    // Bare name: search PATH
    std::env::var_os("PATH")
        .into_iter()
        .flat_map(|p| std::env::split_paths(&p).collect::<Vec<_>>())
        .map(|dir| dir.join(path))
        .find(|p| p.is_file())
        .ok_or_else(|| ExecutorError::Precondition {
            reason: format!("{} not found in PATH", path.display()),
        })
}
