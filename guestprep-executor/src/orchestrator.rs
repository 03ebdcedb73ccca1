//! Provisioning pipeline over a [`HypervisorControl`] and a [`RemoteShell`].
//!
//! preflight → base snapshot → clone → baseline → boot → readiness.
//! Any failure aborts the rest; work already done stays on disk and the
//! idempotent stages skip it on the next run.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use guestprep_core::RestoreBranch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::boot::boot;
use crate::ensure::{ensure_clone, ensure_snapshot, restore_or_bootstrap, CloneOutcome};
use crate::readiness::wait_until_ready;
use crate::{
    preflight, ExecutorError, GuestHandle, HypervisorControl, ProvisionConfig, RemoteShell,
};

/// A booted, freshly reverted guest that accepts remote commands.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PreparedGuest {
    /// The per-slot clone.
    pub guest: GuestHandle,

    /// Address reported by the guest-integration layer.
    pub address: IpAddr,

    /// Whether the clone was created by this run or reattached.
    pub clone: CloneOutcome,

    /// Whether the baseline was reverted to or captured.
    pub baseline: RestoreBranch,

    /// Readiness attempt that succeeded.
    pub attempts: u32,

    /// Timestamp when the guest was confirmed ready.
    pub ready_at: DateTime<Utc>,
}

/// Drives one guest from base image to ready clone.
pub struct Provisioner<H: HypervisorControl, S: RemoteShell> {
    hypervisor: H,
    shell: S,
}

impl<H: HypervisorControl, S: RemoteShell> Provisioner<H, S> {
    /// Create a provisioner.
    #[must_use]
    pub fn new(hypervisor: H, shell: S) -> Self {
        Self { hypervisor, shell }
    }

    /// The hypervisor backend.
    pub fn hypervisor(&self) -> &H {
        &self.hypervisor
    }

    /// The remote shell.
    pub fn shell(&self) -> &S {
        &self.shell
    }

    /// Run the full pipeline for `config`.
    ///
    /// # Errors
    /// - [`ExecutorError::Precondition`] before any hypervisor call if paths
    ///   are invalid.
    /// - [`ExecutorError::Provisioning`] / [`ExecutorError::NoGuestAddress`]
    ///   from the first failing hypervisor stage.
    /// - [`ExecutorError::ReadinessTimeout`] if the guest never accepts the
    ///   probe command.
    /// - [`ExecutorError::Cancelled`] if `cancel` fires.
    pub async fn prepare(
        &self,
        config: &ProvisionConfig,
        cancel: &CancellationToken,
    ) -> Result<PreparedGuest, ExecutorError> {
        preflight::check(
            config,
            self.hypervisor.control_tool(),
            &self.shell.required_tools(),
        )
        .await?;

        let base = GuestHandle::attach(&config.base_image);
        let clone_name = config.clone_name();
        let clone_path = config.clone_path();
        let snapshot = config.identity.base_snapshot_name();

        info!(
            base = %base,
            clone = %clone_name,
            snapshot = %snapshot,
            "preparing guest"
        );

        ensure_snapshot(&self.hypervisor, &base, &snapshot, cancel).await?;

        let (clone, clone_outcome) = ensure_clone(
            &self.hypervisor,
            &base,
            &clone_path,
            &clone_name,
            &snapshot,
            cancel,
        )
        .await?;

        let baseline = restore_or_bootstrap(&self.hypervisor, &clone, &snapshot, cancel).await?;

        let address = boot(&self.hypervisor, &clone, config.display, cancel).await?;

        let attempts = wait_until_ready(
            &self.shell,
            address,
            &config.credentials,
            &config.polling,
            cancel,
        )
        .await?;

        info!(
            clone = %clone,
            %address,
            %clone_outcome,
            %baseline,
            attempts,
            "guest ready"
        );

        Ok(PreparedGuest {
            guest: clone,
            address,
            clone: clone_outcome,
            baseline,
            attempts,
            ready_at: Utc::now(),
        })
    }
}
