//! Cancellation plumbing shared by every blocking stage.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::ExecutorError;

/// Run `fut` unless `cancel` fires first.
///
/// The losing future is dropped; hypervisor and ssh children are spawned with
/// `kill_on_drop`, so an abandoned call does not linger.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    stage: &'static str,
    fut: F,
) -> Result<T, ExecutorError>
where
    F: Future<Output = Result<T, ExecutorError>>,
{
    if cancel.is_cancelled() {
        return Err(ExecutorError::Cancelled { stage });
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ExecutorError::Cancelled { stage }),
        result = fut => result,
    }
}

/// Sleep for `interval`, waking early on cancellation.
pub(crate) async fn sleep(
    cancel: &CancellationToken,
    stage: &'static str,
    interval: Duration,
) -> Result<(), ExecutorError> {
    cancellable(cancel, stage, async {
        tokio::time::sleep(interval).await;
        Ok(())
    })
    .await
}
