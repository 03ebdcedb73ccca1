//! Guest handle: names one hypervisor-managed guest by its descriptor.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use guestprep_core::SnapshotName;

use crate::{ExecutorError, HypervisorControl};

/// A guest known to the hypervisor by its descriptor path.
///
/// Attaching never touches the disk, so a handle can name a clone target
/// that does not exist yet. Snapshots are not cached: every call to
/// [`GuestHandle::snapshots`] asks the hypervisor again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub struct GuestHandle {
    /// Path to the guest descriptor (e.g. a `.vmx` file).
    pub image_path: PathBuf,

    /// Display name derived from `image_path`.
    pub name: String,
}

impl GuestHandle {
    /// Attach to the guest whose descriptor lives at `image_path`.
    #[must_use]
    pub fn attach(image_path: impl Into<PathBuf>) -> Self {
        let image_path = image_path.into();
        let name = guest_name(&image_path);
        Self { image_path, name }
    }

    /// Whether a descriptor is present on disk.
    ///
    /// # Errors
    /// Returns [`ExecutorError::Io`] if the existence check itself fails
    /// (e.g. permission denied on a parent directory).
    pub async fn exists(&self) -> Result<bool, ExecutorError> {
        Ok(tokio::fs::try_exists(&self.image_path).await?)
    }

    /// Query the hypervisor for the guest's current snapshot set.
    ///
    /// # Errors
    /// Propagates the backend's [`ExecutorError::Provisioning`].
    pub async fn snapshots<H: HypervisorControl + ?Sized>(
        &self,
        hypervisor: &H,
    ) -> Result<BTreeSet<SnapshotName>, ExecutorError> {
        hypervisor.list_snapshots(self).await
    }
}

impl fmt::Display for GuestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// File stem of the descriptor, falling back to the whole path.
///
/// `/vms/macos-builder.vmwarevm/macos-builder.vmx` → `macos-builder`.
#[must_use]
pub fn guest_name(image_path: &Path) -> String {
    image_path
        .file_stem()
        .map_or_else(|| image_path.display().to_string(), |s| s.to_string_lossy().into_owned())
}
