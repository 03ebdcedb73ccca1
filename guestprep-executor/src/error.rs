//! Error types for the executor crate.

use std::path::PathBuf;

use guestprep_core::CoreError;

/// Hypervisor operations that can fail during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Operation {
    ListSnapshots,
    CreateSnapshot,
    Clone,
    Revert,
    Start,
    GuestAddress,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ListSnapshots => "list snapshots",
            Self::CreateSnapshot => "create snapshot",
            Self::Clone => "linked clone",
            Self::Revert => "revert to snapshot",
            Self::Start => "start",
            Self::GuestAddress => "query guest address",
        };
        f.write_str(s)
    }
}

/// Coarse classification of an [`ExecutorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Invalid inputs detected before any hypervisor call.
    Precondition,
    /// A hypervisor operation reported failure.
    Provisioning,
    /// The guest never accepted an authenticated remote command.
    ReadinessTimeout,
    /// An external cancellation or deadline stopped the pipeline.
    Cancelled,
}

/// Errors that can occur while provisioning a guest.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// A path or identifier failed validation before any work began.
    #[error("precondition failed: {reason}")]
    Precondition { reason: String },

    /// A hypervisor operation exited unsuccessfully or could not be run.
    #[error("{operation} failed for {}: {reason}", .guest.display())]
    Provisioning {
        operation: Operation,
        guest: PathBuf,
        reason: String,
    },

    /// The guest-integration layer reported no network address.
    #[error("no IP address reported for {}", .guest.display())]
    NoGuestAddress { guest: PathBuf },

    /// No remote command succeeded within the polling budget.
    #[error("guest not reachable over ssh after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    /// Provisioning was cancelled while waiting on `stage`.
    #[error("cancelled during {stage}")]
    Cancelled { stage: &'static str },

    /// Invalid identifier or policy.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Classify the error for exit-code and reporting purposes.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Precondition { .. } | Self::Core(_) => FailureKind::Precondition,
            Self::Provisioning { .. } | Self::NoGuestAddress { .. } | Self::Io(_) => {
                FailureKind::Provisioning
            }
            Self::ReadinessTimeout { .. } => FailureKind::ReadinessTimeout,
            Self::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    pub(crate) fn provisioning(
        operation: Operation,
        guest: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Provisioning {
            operation,
            guest: guest.into(),
            reason: reason.into(),
        }
    }
}
