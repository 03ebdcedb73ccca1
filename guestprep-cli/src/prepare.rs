//! `guestprep prepare`.

use guestprep_executor::{PreparedGuest, Provisioner, VmrunBackend};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::{GlobalArgs, PrepareArgs};
use crate::error::CliError;

/// Provision the guest for this runner slot and block until it is ready.
///
/// `cancel` is the process-wide token fired on SIGINT/SIGTERM; `--timeout`
/// fires the same token when the deadline passes.
///
/// # Errors
/// Returns [`CliError`] for invalid arguments and any pipeline failure.
pub async fn execute(
    args: &PrepareArgs,
    global: &GlobalArgs,
    cancel: &CancellationToken,
) -> Result<PreparedGuest, CliError> {
    let config = args.to_config(global)?;

    let hypervisor =
        VmrunBackend::with_host_type(global.vmrun_path.clone(), global.host_type.clone());
    let provisioner = Provisioner::new(hypervisor, args.shell());

    let deadline = args.deadline().map(|limit| {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            warn!(seconds = limit.as_secs(), "provisioning deadline reached, cancelling");
            token.cancel();
        })
    });

    info!(
        clone = %config.clone_name(),
        storage = %config.storage_dir.display(),
        max_attempts = config.polling.max_attempts,
        interval_secs = config.polling.interval.as_secs(),
        "provisioning guest"
    );

    let result = provisioner.prepare(&config, cancel).await;
    if let Some(task) = deadline {
        task.abort();
    }
    Ok(result?)
}
