//! Remote shell over the system `ssh` client.
//!
//! Password authentication goes through `sshpass -e`, which reads the
//! password from the `SSHPASS` environment variable so it never appears in
//! the process table. Without `sshpass` the client runs in batch mode and
//! relies on key-based login.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use guestprep_core::Credentials;
use tokio::process::Command;

use crate::{ExecutorError, RemoteShell};

/// Options shared by every ssh invocation.
///
/// * `StrictHostKeyChecking=no`: clones are reverted every job, host keys churn.
/// * `UserKnownHostsFile=/dev/null`: keep the runner's known_hosts clean.
/// * `LogLevel=ERROR`: suppress banner noise in the job log.
#[rustfmt::skip]
const SSH_OPTS: &[&str] = &[
    "-o", "StrictHostKeyChecking=no",
    "-o", "UserKnownHostsFile=/dev/null",
    "-o", "LogLevel=ERROR",
];

/// [`RemoteShell`] backed by the `ssh` binary.
#[derive(Debug, Clone)]
pub struct SshCommandShell {
    ssh_path: PathBuf,
    sshpass_path: Option<PathBuf>,
    port: u16,
    connect_timeout: Duration,
}

impl SshCommandShell {
    /// Create a shell that authenticates with the password through `sshpass`.
    #[must_use]
    pub fn new(ssh_path: PathBuf, sshpass_path: Option<PathBuf>) -> Self {
        Self {
            ssh_path,
            sshpass_path,
            port: 22,
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Override the remote port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the TCP connect timeout handed to ssh.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build the full argument vector for the ssh client (without `sshpass`).
    fn ssh_args(&self, host: IpAddr, credentials: &Credentials, command: &str) -> Vec<String> {
        let mut args: Vec<String> = SSH_OPTS.iter().map(|s| (*s).to_owned()).collect();
        args.extend([
            "-o".to_owned(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
        ]);
        if self.sshpass_path.is_some() {
            args.extend([
                "-o".to_owned(),
                "PreferredAuthentications=password,keyboard-interactive".to_owned(),
                "-o".to_owned(),
                "PubkeyAuthentication=no".to_owned(),
                "-o".to_owned(),
                "NumberOfPasswordPrompts=1".to_owned(),
            ]);
        } else {
            args.extend(["-o".to_owned(), "BatchMode=yes".to_owned()]);
        }
        args.extend([
            "-p".to_owned(),
            self.port.to_string(),
            "-l".to_owned(),
            credentials.username.clone(),
            host.to_string(),
            command.to_owned(),
        ]);
        args
    }

    fn build_command(&self, host: IpAddr, credentials: &Credentials, command: &str) -> Command {
        let args = self.ssh_args(host, credentials, command);
        let mut cmd = match &self.sshpass_path {
            Some(sshpass) => {
                let mut cmd = Command::new(sshpass);
                cmd.arg("-e").arg(&self.ssh_path);
                cmd.env("SSHPASS", &credentials.password);
                cmd
            }
            None => Command::new(&self.ssh_path),
        };
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteShell for SshCommandShell {
    fn required_tools(&self) -> Vec<&Path> {
        let mut tools = vec![self.ssh_path.as_path()];
        tools.extend(self.sshpass_path.as_deref());
        tools
    }

    async fn run(
        &self,
        host: IpAddr,
        credentials: &Credentials,
        command: &str,
    ) -> Result<i32, ExecutorError> {
        let output = self
            .build_command(host, credentials, command)
            .output()
            .await
            .map_err(|e| {
                ExecutorError::Io(std::io::Error::new(
                    e.kind(),
                    format!("exec {}: {e}", self.ssh_path.display()),
                ))
            })?;

        let code = output.status.code().unwrap_or(-1);
        if code != 0 {
            tracing::debug!(
                %host,
                code,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ssh command did not succeed"
            );
        }
        Ok(code)
    }
}
