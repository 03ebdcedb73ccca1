//! Error types for the CLI crate.

use guestprep_core::CoreError;
use guestprep_executor::{ExecutorError, FailureKind};

/// Environment variable the CI custom executor uses to publish the exit code
/// that marks a job as a system failure.
pub const SYSTEM_FAILURE_EXIT_CODE_VAR: &str = "SYSTEM_FAILURE_EXIT_CODE";

/// Exit code used when the CI executor does not provide one.
pub const DEFAULT_SYSTEM_FAILURE_EXIT_CODE: i32 = 1;

/// Errors that end a `guestprep` invocation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum CliError {
    /// An error propagated from the provisioning pipeline.
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// An argument could not be turned into a valid identifier or policy.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] CoreError),
}

impl CliError {
    /// Classify the error the same way the pipeline does.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            CliError::Executor(e) => e.kind(),
            CliError::InvalidArgument(_) => FailureKind::Precondition,
        }
    }
}

/// Resolve the system-failure exit code from the raw variable value.
///
/// Unset, unparsable, or zero values fall back to
/// [`DEFAULT_SYSTEM_FAILURE_EXIT_CODE`]: a failure must never exit 0.
#[must_use]
pub fn system_failure_exit_code(raw: Option<&str>) -> i32 {
    raw.and_then(|v| v.trim().parse::<i32>().ok())
        .filter(|code| *code != 0)
        .unwrap_or(DEFAULT_SYSTEM_FAILURE_EXIT_CODE)
}
