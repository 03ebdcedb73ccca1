//! Readiness poller: prove the guest accepts an authenticated remote command.
//!
//! Each attempt opens a fresh session, so a daemon that is not up yet or a
//! network stack that restarts mid-boot only costs one attempt. Connection
//! and authentication errors count the same as a non-zero exit.
//!
//! The policy's last iteration is a guard: when the counter reaches
//! `max_attempts` the poller fails without connecting again.

use std::net::IpAddr;

use guestprep_core::{Credentials, PollingPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cancel::{cancellable, sleep};
use crate::{ExecutorError, RemoteShell};

/// No-op command whose only job is a full authenticated round trip.
pub const PROBE_COMMAND: &str = "echo -n 2>&1";

/// Poll `host` until [`PROBE_COMMAND`] exits 0.
///
/// Returns the number of the attempt that succeeded.
///
/// # Errors
/// Returns [`ExecutorError::ReadinessTimeout`] once the counter reaches
/// `policy.max_attempts`, and [`ExecutorError::Cancelled`] if `cancel` fires
/// during an attempt or the inter-attempt sleep.
pub async fn wait_until_ready<S: RemoteShell + ?Sized>(
    shell: &S,
    host: IpAddr,
    credentials: &Credentials,
    policy: &PollingPolicy,
    cancel: &CancellationToken,
) -> Result<u32, ExecutorError> {
    let mut attempt: u32 = 1;
    loop {
        if attempt >= policy.max_attempts {
            warn!(%host, max_attempts = policy.max_attempts, "guest never became reachable");
            return Err(ExecutorError::ReadinessTimeout {
                attempts: policy.connection_budget(),
            });
        }

        debug!(%host, attempt, max_attempts = policy.max_attempts, "probing guest over ssh");
        let outcome =
            cancellable(cancel, "readiness", shell.run(host, credentials, PROBE_COMMAND)).await;

        match outcome {
            Ok(0) => {
                info!(%host, attempt, "guest is ready");
                return Ok(attempt);
            }
            Ok(code) => {
                info!(%host, attempt, code, "guest not ready yet");
            }
            Err(ExecutorError::Cancelled { stage }) => {
                return Err(ExecutorError::Cancelled { stage });
            }
            Err(e) => {
                info!(%host, attempt, error = %e, "guest not ready yet");
            }
        }

        sleep(cancel, "readiness", policy.interval).await?;
        attempt += 1;
    }
}
