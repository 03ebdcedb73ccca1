/// Errors produced by the `guestprep-core` crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// An identifier used to derive guest names failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidIdentifier { field: &'static str, reason: String },

    /// A snapshot name was empty or contained characters the hypervisor rejects.
    #[error("invalid snapshot name '{name}': {reason}")]
    InvalidSnapshotName { name: String, reason: String },

    /// The readiness polling policy cannot make progress.
    #[error("invalid polling policy: {reason}")]
    InvalidPollingPolicy { reason: String },
}
