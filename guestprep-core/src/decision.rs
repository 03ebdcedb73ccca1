//! Branch decisions for the idempotent provisioning stages.
//!
//! These functions hold no state and perform no I/O; the executor wraps them
//! with the hypervisor calls.

use std::collections::BTreeSet;
use std::fmt;

use crate::id::SnapshotName;

/// What the baseline stage does to a clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestoreBranch {
    /// The baseline exists: discard the previous job's state.
    Revert,
    /// First run for this clone: capture its pristine state as the baseline.
    Create,
}

impl fmt::Display for RestoreBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revert => f.write_str("revert"),
            Self::Create => f.write_str("create"),
        }
    }
}

/// A snapshot is created only when it is missing.
#[must_use]
pub const fn should_create_snapshot(exists: bool) -> bool {
    !exists
}

/// A clone is made only when no descriptor is present at the target path.
#[must_use]
pub const fn should_clone(target_exists: bool) -> bool {
    !target_exists
}

/// Exactly one of revert or create, decided by baseline membership.
#[must_use]
pub const fn choose_restore_branch(baseline_exists: bool) -> RestoreBranch {
    if baseline_exists {
        RestoreBranch::Revert
    } else {
        RestoreBranch::Create
    }
}

/// Membership test used by every "exists" decision.
#[must_use]
pub fn snapshot_exists(snapshots: &BTreeSet<SnapshotName>, name: &SnapshotName) -> bool {
    snapshots.contains(name)
}
