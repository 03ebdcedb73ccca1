//! Precondition checks run once before any hypervisor call.

use std::path::Path;

use tracing::{debug, warn};

use crate::vmrun::which_binary;
use crate::{ExecutorError, ProvisionConfig};

/// Validate the paths a `prepare` run depends on.
///
/// `remote_tools` are the local binaries the remote shell spawns for every
/// readiness attempt (for example `ssh` and `sshpass`).
///
/// # Errors
/// Returns [`ExecutorError::Precondition`] if the base image is missing, the
/// control tool or a remote-shell tool is not an executable file, or the
/// storage directory is missing or not writable.
pub async fn check(
    config: &ProvisionConfig,
    control_tool: &Path,
    remote_tools: &[&Path],
) -> Result<(), ExecutorError> {
    check_base_image(&config.base_image).await?;
    check_executable("control tool", control_tool).await?;
    for tool in remote_tools {
        check_executable("remote shell tool", tool).await?;
    }
    check_writable_dir(&config.storage_dir).await?;
    debug!(
        base = %config.base_image.display(),
        tool = %control_tool.display(),
        storage = %config.storage_dir.display(),
        "preconditions satisfied"
    );
    Ok(())
}

async fn check_base_image(path: &Path) -> Result<(), ExecutorError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(precondition(format!(
            "base image {} is not a file",
            path.display()
        ))),
        Err(e) => Err(precondition(format!(
            "base image {}: {e}",
            path.display()
        ))),
    }
}

async fn check_executable(role: &str, path: &Path) -> Result<(), ExecutorError> {
    let resolved = which_binary(path).map_err(|e| match e {
        ExecutorError::Precondition { reason } => precondition(format!("{role} {reason}")),
        other => other,
    })?;
    let meta = tokio::fs::metadata(&resolved)
        .await
        .map_err(|e| precondition(format!("{role} {}: {e}", resolved.display())))?;
    if !meta.is_file() {
        return Err(precondition(format!(
            "{role} {} is not a file",
            resolved.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Err(precondition(format!(
                "{role} {} is not executable",
                resolved.display()
            )));
        }
    }
    Ok(())
}

async fn check_writable_dir(path: &Path) -> Result<(), ExecutorError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| precondition(format!("storage directory {}: {e}", path.display())))?;
    if !meta.is_dir() {
        return Err(precondition(format!(
            "storage directory {} is not a directory",
            path.display()
        )));
    }

    // Permission bits lie under root and ACLs; probe with a real write.
    let probe = path.join(format!(".guestprep-write-probe-{}", std::process::id()));
    tokio::fs::write(&probe, b"").await.map_err(|e| {
        precondition(format!(
            "storage directory {} is not writable: {e}",
            path.display()
        ))
    })?;
    remove_scratch_file(&probe).await;
    Ok(())
}

/// Best-effort cleanup; a leftover probe file is logged, never fatal.
async fn remove_scratch_file(probe: &Path) -> bool {
    match tokio::fs::remove_file(probe).await {
        Ok(()) => true,
        Err(e) => {
            warn!(probe = %probe.display(), error = %e, "could not remove write probe");
            false
        }
    }
}

fn precondition(reason: String) -> ExecutorError {
    ExecutorError::Precondition { reason }
}
