//! Entry point for the `guestprep` binary.

use clap::Parser;
use guestprep_cli::cli::Cli;
use guestprep_cli::error::{system_failure_exit_code, SYSTEM_FAILURE_EXIT_CODE_VAR};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn failure_exit_code() -> i32 {
    system_failure_exit_code(std::env::var(SYSTEM_FAILURE_EXIT_CODE_VAR).ok().as_deref())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(failure_exit_code());
        }
    };

    let cancel = CancellationToken::new();
    guestprep_cli::cancel_on_signal(cancel.clone());

    if let Err(e) = guestprep_cli::run(cli, &cancel).await {
        tracing::error!(kind = ?e.kind(), error = %e, "guest preparation failed");
        std::process::exit(failure_exit_code());
    }
}
