//! Idempotent provisioning stages.
//!
//! Each stage asks the hypervisor (or the filesystem) for current state,
//! hands the answer to a pure decision from `guestprep_core`, and performs at
//! most one mutating call. Re-running a stage after a crash picks up where
//! the previous run stopped.

use std::fmt;
use std::path::Path;

use guestprep_core::{
    choose_restore_branch, should_clone, should_create_snapshot, snapshot_exists, RestoreBranch,
    SnapshotName,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cancel::cancellable;
use crate::error::Operation;
use crate::{ExecutorError, GuestHandle, HypervisorControl};

/// What [`ensure_snapshot`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The snapshot was already present; nothing was created.
    AlreadyPresent,
    /// The snapshot was created by this call.
    Created,
}

/// What [`ensure_clone`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    /// A descriptor already existed at the target; no clone was made.
    Reattached,
    /// A new linked clone was created.
    Cloned,
}

impl fmt::Display for CloneOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reattached => f.write_str("reattached"),
            Self::Cloned => f.write_str("cloned"),
        }
    }
}

/// Create `name` on `guest` unless it already exists.
///
/// After a creation the snapshot set is queried again, and the call fails if
/// the new snapshot is not visible.
///
/// # Errors
/// Returns [`ExecutorError::Provisioning`] if listing or creating fails, and
/// [`ExecutorError::Cancelled`] if `cancel` fires first.
pub async fn ensure_snapshot<H: HypervisorControl + ?Sized>(
    hypervisor: &H,
    guest: &GuestHandle,
    name: &SnapshotName,
    cancel: &CancellationToken,
) -> Result<SnapshotOutcome, ExecutorError> {
    let existing = cancellable(cancel, "snapshot", guest.snapshots(hypervisor)).await?;

    if !should_create_snapshot(snapshot_exists(&existing, name)) {
        info!(guest = %guest, snapshot = %name, "snapshot already present, skipping");
        return Ok(SnapshotOutcome::AlreadyPresent);
    }

    info!(guest = %guest, snapshot = %name, "creating snapshot");
    cancellable(cancel, "snapshot", hypervisor.create_snapshot(guest, name)).await?;

    let refreshed = cancellable(cancel, "snapshot", guest.snapshots(hypervisor)).await?;
    if !snapshot_exists(&refreshed, name) {
        return Err(ExecutorError::provisioning(
            Operation::CreateSnapshot,
            &guest.image_path,
            format!("snapshot '{name}' not listed after creation"),
        ));
    }
    Ok(SnapshotOutcome::Created)
}

/// Linked-clone `base` from `parent` into `target` unless a descriptor is
/// already there, in which case the existing clone is reattached.
///
/// # Errors
/// Returns [`ExecutorError::Provisioning`] if the clone fails or leaves no
/// descriptor behind, [`ExecutorError::Io`] if the existence check fails, and
/// [`ExecutorError::Cancelled`] if `cancel` fires first.
pub async fn ensure_clone<H: HypervisorControl + ?Sized>(
    hypervisor: &H,
    base: &GuestHandle,
    target: &Path,
    target_name: &str,
    parent: &SnapshotName,
    cancel: &CancellationToken,
) -> Result<(GuestHandle, CloneOutcome), ExecutorError> {
    let existing = GuestHandle::attach(target);

    if !should_clone(existing.exists().await?) {
        info!(clone = %target_name, path = %target.display(), "clone already exists, reattaching");
        return Ok((existing, CloneOutcome::Reattached));
    }

    info!(
        base = %base,
        clone = %target_name,
        parent = %parent,
        path = %target.display(),
        "creating linked clone"
    );
    let clone = cancellable(
        cancel,
        "clone",
        hypervisor.linked_clone(base, parent, target, target_name),
    )
    .await?;

    if !clone.exists().await? {
        return Err(ExecutorError::provisioning(
            Operation::Clone,
            target,
            "clone reported success but no descriptor was written",
        ));
    }
    Ok((clone, CloneOutcome::Cloned))
}

/// Revert `clone` to `baseline`, or capture `baseline` if this clone has none.
///
/// Exactly one of revert or create runs per call.
///
/// # Errors
/// Returns [`ExecutorError::Provisioning`] if listing, reverting or creating
/// fails, and [`ExecutorError::Cancelled`] if `cancel` fires first.
pub async fn restore_or_bootstrap<H: HypervisorControl + ?Sized>(
    hypervisor: &H,
    clone: &GuestHandle,
    baseline: &SnapshotName,
    cancel: &CancellationToken,
) -> Result<RestoreBranch, ExecutorError> {
    let existing = cancellable(cancel, "baseline", clone.snapshots(hypervisor)).await?;
    let branch = choose_restore_branch(snapshot_exists(&existing, baseline));

    match branch {
        RestoreBranch::Revert => {
            info!(guest = %clone, snapshot = %baseline, "reverting to baseline snapshot");
            cancellable(cancel, "baseline", hypervisor.revert_to_snapshot(clone, baseline))
                .await?;
        }
        RestoreBranch::Create => {
            info!(guest = %clone, snapshot = %baseline, "no baseline yet, capturing fresh clone");
            cancellable(cancel, "baseline", hypervisor.create_snapshot(clone, baseline)).await?;
        }
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::fake::{Call, FakeHypervisor};

    fn snap(s: &str) -> SnapshotName {
        match SnapshotName::new(s) {
            Ok(n) => n,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    fn tempdir() -> tempfile::TempDir {
        match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => panic!("tempdir: {e}"),
        }
    }

    #[tokio::test]
    async fn ensure_snapshot_twice_creates_once() {
        let hv = FakeHypervisor::new();
        let guest = GuestHandle::attach("/vms/base.vmx");
        let name = snap("base-snapshot-x");
        let cancel = CancellationToken::new();

        let first = ensure_snapshot(&hv, &guest, &name, &cancel).await;
        assert!(matches!(first, Ok(SnapshotOutcome::Created)), "got {first:?}");
        let after_first = guest.snapshots(&hv).await.ok();

        let second = ensure_snapshot(&hv, &guest, &name, &cancel).await;
        assert!(matches!(second, Ok(SnapshotOutcome::AlreadyPresent)), "got {second:?}");
        assert_eq!(
            guest.snapshots(&hv).await.ok(),
            after_first,
            "second call must not change the set"
        );

        let creates = hv
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Snapshot(..)))
            .count();
        assert_eq!(creates, 1, "creation must happen at most once");
    }

    #[tokio::test]
    async fn ensure_snapshot_propagates_create_failure() {
        let hv = FakeHypervisor::new().failing(Operation::CreateSnapshot);
        let guest = GuestHandle::attach("/vms/base.vmx");
        let result = ensure_snapshot(&hv, &guest, &snap("s"), &CancellationToken::new()).await;
        assert!(
            matches!(
                result,
                Err(ExecutorError::Provisioning {
                    operation: Operation::CreateSnapshot,
                    ..
                })
            ),
            "got {result:?}"
        );
    }

    #[tokio::test]
    async fn ensure_clone_reattaches_existing_target_without_cloning() {
        let dir = tempdir();
        let target = dir.path().join("c.vmwarevm").join("c.vmx");
        if let Err(e) = std::fs::create_dir_all(dir.path().join("c.vmwarevm"))
            .and_then(|()| std::fs::write(&target, b"existing"))
        {
            panic!("setup: {e}");
        }
        let hv = FakeHypervisor::new();
        let base = GuestHandle::attach("/vms/base.vmx");

        let result = ensure_clone(
            &hv,
            &base,
            &target,
            "c",
            &snap("p"),
            &CancellationToken::new(),
        )
        .await;
        let (handle, outcome) = match result {
            Ok(r) => r,
            Err(e) => panic!("ensure_clone failed: {e}"),
        };
        assert_eq!(outcome, CloneOutcome::Reattached);
        assert_eq!(handle.image_path, target);
        assert!(hv.calls().is_empty(), "no hypervisor call may be made on reattach");
    }

    #[tokio::test]
    async fn ensure_clone_creates_linked_clone_from_parent() {
        let dir = tempdir();
        let target = dir.path().join("c.vmwarevm").join("c.vmx");
        let base_path = PathBuf::from("/vms/base.vmx");
        let hv = FakeHypervisor::new().with_snapshot(&base_path, "p");
        let base = GuestHandle::attach(&base_path);

        let result = ensure_clone(
            &hv,
            &base,
            &target,
            "c",
            &snap("p"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Ok((_, CloneOutcome::Cloned))), "got {result:?}");
        assert_eq!(
            hv.calls(),
            vec![Call::Clone {
                base: base_path,
                target: target.clone(),
                parent: "p".to_owned(),
            }]
        );
        assert!(target.exists());
    }

    #[tokio::test]
    async fn restore_reverts_when_baseline_exists() {
        let clone = PathBuf::from("/clones/c.vmx");
        let hv = FakeHypervisor::new().with_snapshot(&clone, "clean");
        let handle = GuestHandle::attach(&clone);

        let branch = restore_or_bootstrap(
            &hv,
            &handle,
            &snap("clean"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(branch, Ok(RestoreBranch::Revert)), "got {branch:?}");
        assert_eq!(hv.mutations(), vec![Call::Revert(clone, "clean".to_owned())]);
    }

    #[tokio::test]
    async fn restore_bootstraps_when_baseline_missing() {
        let clone = PathBuf::from("/clones/c.vmx");
        let hv = FakeHypervisor::new();
        let handle = GuestHandle::attach(&clone);

        let branch = restore_or_bootstrap(
            &hv,
            &handle,
            &snap("clean"),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(branch, Ok(RestoreBranch::Create)), "got {branch:?}");
        assert_eq!(hv.mutations(), vec![Call::Snapshot(clone, "clean".to_owned())]);
    }

    #[tokio::test]
    async fn restore_failure_surfaces_as_provisioning() {
        let clone = PathBuf::from("/clones/c.vmx");
        let hv = FakeHypervisor::new().with_snapshot(&clone, "clean").failing(Operation::Revert);
        let handle = GuestHandle::attach(&clone);

        let result = restore_or_bootstrap(
            &hv,
            &handle,
            &snap("clean"),
            &CancellationToken::new(),
        )
        .await;
        assert!(
            matches!(
                result,
                Err(ExecutorError::Provisioning {
                    operation: Operation::Revert,
                    ..
                })
            ),
            "got {result:?}"
        );
        assert_eq!(hv.mutations().len(), 1, "a failed revert must not fall back to create");
    }
}
