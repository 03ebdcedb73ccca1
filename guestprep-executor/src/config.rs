//! Provisioning configuration.

use std::path::{Path, PathBuf};

use guestprep_core::{
    CloneIdentity, ConcurrencySlot, CoreError, Credentials, PollingPolicy, RunnerId,
};

use crate::handle::guest_name;
use crate::DisplayMode;

/// Everything one `prepare` run needs, passed in explicitly.
///
/// The runner id and concurrency slot arrive here from the caller; nothing in
/// the pipeline reads the process environment.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProvisionConfig {
    /// Descriptor of the read-only base guest.
    pub base_image: PathBuf,

    /// Directory that holds generated clones.
    pub storage_dir: PathBuf,

    /// Deterministic identity of the clone for this runner slot.
    pub identity: CloneIdentity,

    /// Login used by the readiness check.
    pub credentials: Credentials,

    /// Readiness retry budget.
    pub polling: PollingPolicy,

    /// Console attachment on start.
    pub display: DisplayMode,
}

impl ProvisionConfig {
    /// Create a config with the default polling policy and a headless start.
    ///
    /// The clone's base name is the file stem of `base_image`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] if the derived base name is
    /// not a valid file-name component.
    pub fn new(
        base_image: PathBuf,
        storage_dir: PathBuf,
        runner_id: RunnerId,
        slot: ConcurrencySlot,
        credentials: Credentials,
    ) -> Result<Self, CoreError> {
        let identity = CloneIdentity::new(guest_name(&base_image), runner_id, slot)?;
        Ok(Self {
            base_image,
            storage_dir,
            identity,
            credentials,
            polling: PollingPolicy::default(),
            display: DisplayMode::Headless,
        })
    }

    /// Replace the polling policy.
    #[must_use]
    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Replace the display mode.
    #[must_use]
    pub fn with_display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    /// Deterministic clone name for this runner slot.
    #[must_use]
    pub fn clone_name(&self) -> String {
        self.identity.clone_name()
    }

    /// `{storage}/{clone}.vmwarevm/{clone}.vmx`.
    #[must_use]
    pub fn clone_path(&self) -> PathBuf {
        clone_path(&self.storage_dir, &self.clone_name())
    }
}

/// Location of a clone's descriptor inside the storage directory.
#[must_use]
pub fn clone_path(storage_dir: &Path, clone_name: &str) -> PathBuf {
    storage_dir
        .join(format!("{clone_name}.vmwarevm"))
        .join(format!("{clone_name}.vmx"))
}
