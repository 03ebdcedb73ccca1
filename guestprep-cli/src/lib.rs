//! Command-line front end for guest provisioning.
//!
//! Parses the invocation surface, wires process signals and the optional
//! deadline into a cancellation token, and maps failures to the CI
//! system-failure exit code.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod cli;
pub mod error;
pub mod prepare;

use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Dispatch the parsed command line.
///
/// # Errors
/// Propagates the subcommand's [`CliError`].
pub async fn run(cli: Cli, cancel: &CancellationToken) -> Result<(), CliError> {
    match cli.command {
        Command::Prepare(args) => {
            let prepared = prepare::execute(&args, &cli.global, cancel).await?;
            tracing::info!(
                guest = %prepared.guest,
                address = %prepared.address,
                ready_at = %prepared.ready_at,
                "guest prepared"
            );
            Ok(())
        }
    }
}

/// Cancel `token` on Ctrl-C or, on Unix, SIGTERM.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::warn!("termination signal received, cancelling");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "SIGTERM handler unavailable, watching Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
