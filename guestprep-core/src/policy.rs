use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Default number of loop iterations in the readiness poller.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// Default delay between readiness attempts.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Login used to prove the guest accepts authenticated remote commands.
///
/// The password is never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Credentials {
    /// Remote account name.
    pub username: String,
    /// Remote account password.
    pub password: String,
}

impl Credentials {
    /// Creates a new credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Budget for the readiness poller.
///
/// `max_attempts` counts loop iterations, and the last iteration is a guard
/// that fails without connecting. A policy of 60 therefore makes at most 59
/// connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPollingPolicy")]
#[non_exhaustive]
pub struct PollingPolicy {
    /// Total loop iterations, including the final guard.
    pub max_attempts: u32,
    /// Sleep between a failed attempt and the next iteration.
    pub interval: Duration,
}

/// Unvalidated wire form of [`PollingPolicy`].
#[derive(Deserialize)]
struct RawPollingPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl TryFrom<RawPollingPolicy> for PollingPolicy {
    type Error = CoreError;

    fn try_from(raw: RawPollingPolicy) -> Result<Self, Self::Error> {
        Self::new(raw.max_attempts, raw.interval)
    }
}

impl PollingPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidPollingPolicy`] if `max_attempts` is zero.
    pub fn new(max_attempts: u32, interval: Duration) -> Result<Self, CoreError> {
        if max_attempts == 0 {
            return Err(CoreError::InvalidPollingPolicy {
                reason: "max_attempts must be at least 1".to_owned(),
            });
        }
        Ok(Self { max_attempts, interval })
    }

    /// Number of real connection attempts this policy allows.
    #[must_use]
    pub fn connection_budget(&self) -> u32 {
        self.max_attempts.saturating_sub(1)
    }

    /// Worst-case time spent sleeping before the guard trips.
    #[must_use]
    pub fn worst_case_wait(&self) -> Duration {
        self.interval.saturating_mul(self.connection_budget())
    }
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}
