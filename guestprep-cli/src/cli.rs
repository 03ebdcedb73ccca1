//! Command-line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use guestprep_core::{
    ConcurrencySlot, Credentials, PollingPolicy, RunnerId, DEFAULT_MAX_ATTEMPTS,
};
use guestprep_executor::{DisplayMode, ProvisionConfig, SshCommandShell, DEFAULT_VMRUN_PATH};

use crate::error::CliError;

/// Provision clean VMware guests for CI jobs
#[derive(Parser, Debug)]
#[command(name = "guestprep", version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Path to the `vmrun` control tool
    #[arg(long, env = "GUESTPREP_VMRUN_PATH", default_value = DEFAULT_VMRUN_PATH)]
    pub vmrun_path: PathBuf,

    /// `vmrun -T` host type (fusion, ws, player)
    #[arg(long, env = "GUESTPREP_HOST_TYPE", default_value = "fusion")]
    pub host_type: String,

    /// Writable directory that holds generated clones
    #[arg(long, env = "GUESTPREP_STORAGE_DIR")]
    pub storage_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Clone, revert and boot the guest for this runner slot, then wait for ssh
    Prepare(PrepareArgs),
}

#[derive(Args, Debug, Clone)]
pub struct PrepareArgs {
    /// Base guest descriptor (.vmx) to clone from
    pub base_image: PathBuf,

    /// Start the guest with a graphical console
    #[arg(long)]
    pub gui: bool,

    /// Remote login used for the readiness check
    #[arg(long, env = "GUESTPREP_SSH_USER", default_value = "builder")]
    pub username: String,

    /// Remote password used for the readiness check
    #[arg(long, env = "GUESTPREP_SSH_PASSWORD", default_value = "builder", hide_env_values = true)]
    pub password: String,

    /// CI runner identifier
    #[arg(long, env = "CUSTOM_ENV_CI_RUNNER_ID")]
    pub runner_id: String,

    /// Concurrency slot of this job on the runner
    #[arg(long, env = "CUSTOM_ENV_CI_CONCURRENT_PROJECT_ID")]
    pub concurrent_id: String,

    /// Readiness loop iterations; the last one is a guard that never connects
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub max_attempts: u32,

    /// Seconds to wait between readiness attempts
    #[arg(long, default_value_t = 60)]
    pub poll_interval: u64,

    /// Abort provisioning after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Path to the ssh client
    #[arg(long, default_value = "ssh")]
    pub ssh_path: PathBuf,

    /// Path to sshpass, used to feed the password to ssh
    #[arg(long, default_value = "sshpass")]
    pub sshpass_path: PathBuf,

    /// Authenticate with the runner's ssh keys instead of the password
    #[arg(long)]
    pub ssh_key_auth: bool,

    /// Remote ssh port
    #[arg(long, default_value_t = 22)]
    pub ssh_port: u16,

    /// Seconds ssh waits for a TCP connection per attempt
    #[arg(long, default_value_t = 10)]
    pub ssh_connect_timeout: u64,
}

impl PrepareArgs {
    /// Build the pipeline configuration.
    ///
    /// # Errors
    /// Returns [`CliError::InvalidArgument`] for an empty or path-like runner
    /// id, slot, or base name, and for a zero attempt budget.
    pub fn to_config(&self, global: &GlobalArgs) -> Result<ProvisionConfig, CliError> {
        let polling =
            PollingPolicy::new(self.max_attempts, Duration::from_secs(self.poll_interval))?;
        let config = ProvisionConfig::new(
            self.base_image.clone(),
            global.storage_dir.clone(),
            RunnerId::new(self.runner_id.clone())?,
            ConcurrencySlot::new(self.concurrent_id.clone())?,
            Credentials::new(self.username.clone(), self.password.clone()),
        )?
        .with_polling(polling)
        .with_display(DisplayMode::from_interactive(self.gui));
        Ok(config)
    }

    /// Build the ssh-backed remote shell.
    #[must_use]
    pub fn shell(&self) -> SshCommandShell {
        let sshpass = (!self.ssh_key_auth).then(|| self.sshpass_path.clone());
        SshCommandShell::new(self.ssh_path.clone(), sshpass)
            .with_port(self.ssh_port)
            .with_connect_timeout(Duration::from_secs(self.ssh_connect_timeout))
    }

    /// Overall deadline, if one was requested.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}
