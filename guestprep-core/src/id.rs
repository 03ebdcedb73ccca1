use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Reject values that cannot safely become part of a file name or a
/// hypervisor argument.
fn validate_component(field: &'static str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::InvalidIdentifier {
            field,
            reason: "must not be empty".to_owned(),
        });
    }
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '\0') || c.is_control())
    {
        return Err(CoreError::InvalidIdentifier {
            field,
            reason: format!("contains forbidden character {c:?}"),
        });
    }
    if value == "." || value == ".." {
        return Err(CoreError::InvalidIdentifier {
            field,
            reason: "must not be a relative path component".to_owned(),
        });
    }
    Ok(())
}

/// Identifies the CI runner that owns a clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub struct RunnerId(String);

impl RunnerId {
    /// Creates a `RunnerId` from any string-like value.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] if the value is empty or
    /// contains path separators or control characters.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        validate_component("runner id", &id)?;
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RunnerId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RunnerId> for String {
    fn from(value: RunnerId) -> Self {
        value.0
    }
}

/// The concurrency slot a job occupies on its runner.
///
/// The CI scheduler guarantees one job per slot at a time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub struct ConcurrencySlot(String);

impl ConcurrencySlot {
    /// Creates a `ConcurrencySlot` from any string-like value.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] if the value is empty or
    /// contains path separators or control characters.
    pub fn new(slot: impl Into<String>) -> Result<Self, CoreError> {
        let slot = slot.into();
        validate_component("concurrency slot", &slot)?;
        Ok(Self(slot))
    }

    /// Returns the slot as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConcurrencySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ConcurrencySlot {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ConcurrencySlot> for String {
    fn from(value: ConcurrencySlot) -> Self {
        value.0
    }
}

/// A snapshot name, unique within one guest's snapshot set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[non_exhaustive]
pub struct SnapshotName(String);

impl SnapshotName {
    /// Creates a `SnapshotName`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidSnapshotName`] if the name is empty, has
    /// surrounding whitespace, or contains a line break (the hypervisor lists
    /// snapshots one per line).
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("must not be empty")
        } else if name.trim() != name {
            Some("must not have leading or trailing whitespace")
        } else if name.contains(['\n', '\r']) {
            Some("must not contain line breaks")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CoreError::InvalidSnapshotName {
                name,
                reason: reason.to_owned(),
            }),
            None => Ok(Self(name)),
        }
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SnapshotName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SnapshotName> for String {
    fn from(value: SnapshotName) -> Self {
        value.0
    }
}

/// The inputs that determine which clone a job runs in.
///
/// Every derived name is a pure function of these three fields, so at most
/// one clone exists per (base image, runner, concurrency slot).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[non_exhaustive]
pub struct CloneIdentity {
    /// Name of the base guest the clone is derived from.
    pub base_name: String,
    /// Runner that owns the clone.
    pub runner_id: RunnerId,
    /// Concurrency slot on that runner.
    pub slot: ConcurrencySlot,
}

impl CloneIdentity {
    /// Creates a `CloneIdentity`.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidIdentifier`] if `base_name` is not a valid
    /// file-name component.
    pub fn new(
        base_name: impl Into<String>,
        runner_id: RunnerId,
        slot: ConcurrencySlot,
    ) -> Result<Self, CoreError> {
        let base_name = base_name.into();
        validate_component("base name", &base_name)?;
        Ok(Self { base_name, runner_id, slot })
    }

    /// `{base}-runner-{runner}-concurrent-{slot}`.
    #[must_use]
    pub fn clone_name(&self) -> String {
        format!(
            "{}-runner-{}-concurrent-{}",
            self.base_name, self.runner_id, self.slot
        )
    }

    /// Snapshot taken on the base guest that the linked clone is cut from.
    ///
    /// The clone's own baseline snapshot carries the same name.
    #[must_use]
    pub fn base_snapshot_name(&self) -> SnapshotName {
        // Cannot fail: every component is validated and the prefix is fixed.
        SnapshotName(format!("base-snapshot-{}", self.clone_name()))
    }
}

impl fmt::Display for CloneIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.clone_name())
    }
}
