//! Remote command execution over SSH
//!
//! Shells out to the OpenSSH client. Host keys are not verified: bootstrap
//! hosts and freshly installed machines have no known key yet.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use shared::{process_info, ProcessId};

use crate::core::ActionLog;
use crate::error::{ProvisionError, ProvisionResult};
use crate::traits::RemoteExecutor;

pub struct SshExecutor {
    binary: PathBuf,
    key_file: PathBuf,
}

impl SshExecutor {
    pub fn new(key_file: impl Into<PathBuf>) -> Self {
        Self {
            binary: PathBuf::from("ssh"),
            key_file: key_file.into(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    fn command(&self, host: &str, user: &str, command: &str) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i")
            .arg(&self.key_file)
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "BatchMode=yes"])
            .args(["-o", "ServerAliveInterval=3"])
            .args(["-o", "ServerAliveCountMax=3"])
            .arg(format!("{user}@{host}"))
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn execute(&self, host: &str, user: &str, command: &str, log: &ActionLog) -> ProvisionResult<bool> {
        process_info!(ProcessId::current(), "AUDIT\tSSH\t{}@{}\t{}", user, host, command);

        let mut child = self.command(host, user, command).spawn().map_err(|e| ProvisionError::Remote {
            host: host.to_string(),
            message: e.to_string(),
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let pump_stdout = async {
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.out(format!("STDOUT: {line}"));
                }
            }
        };
        let pump_stderr = async {
            if let Some(stderr) = stderr {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    log.err(format!("STDERR: {line}"));
                }
            }
        };
        tokio::join!(pump_stdout, pump_stderr);

        let status = child.wait().await?;
        log.out(format!("ssh {host} exited with {}", status.code().unwrap_or(-1)));
        Ok(status.success())
    }
}
