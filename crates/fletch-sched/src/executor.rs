//! Remote command execution over SSH.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::host::Host;

/// Result type for remote execution.
pub type ExecResult<T> = Result<T, ExecError>;

/// Marker printed between commands so captured output can be split back.
const SEPARATOR: &str = "__FLETCH_CMD_BOUNDARY__";

/// ssh uses exit status 255 for its own failures.
const SSH_TRANSPORT_EXIT: i32 = 255;

/// Errors from running commands on a remote host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The connection worked but a command exited non-zero.
    ///
    /// Probes, `grep` filters with no match and unknown job ids all land here.
    #[error("command `{command}` on {host} exited with status {code}: {stderr}")]
    NonZeroExit {
        host: String,
        command: String,
        code: i32,
        stderr: String,
    },

    /// The remote host could not be reached or the session broke.
    #[error("connection to {host} failed: {message}")]
    Transport { host: String, message: String },
}

impl ExecError {
    /// Whether the failure came from the connection rather than the command.
    pub fn is_transport(&self) -> bool {
        matches!(self, ExecError::Transport { .. })
    }
}

/// Runs an ordered list of shell commands on a host as one session.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `commands` in order and return each command's captured stdout.
    ///
    /// Fails as soon as one command fails; later commands are not run.
    async fn run(&self, host: &Host, commands: &[String]) -> ExecResult<Vec<String>>;
}

#[async_trait]
impl<T: RemoteExecutor + ?Sized> RemoteExecutor for Arc<T> {
    async fn run(&self, host: &Host, commands: &[String]) -> ExecResult<Vec<String>> {
        (**self).run(host, commands).await
    }
}

/// Configuration for [`SshExecutor`].
#[derive(Debug, Clone)]
pub struct SshConfig {
    /// ssh binary.
    pub ssh_binary: String,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Extra attempts after a transport failure.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_binary: "ssh".to_string(),
            timeout: Duration::from_secs(120),
            retries: 3,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// [`RemoteExecutor`] backed by the system `ssh` client in batch mode.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    /// Create an executor with the given configuration.
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    async fn run_once(&self, host: &Host, script: &str) -> ExecResult<String> {
        let output = tokio::time::timeout(
            self.config.timeout,
            Command::new(&self.config.ssh_binary)
                .args(["-o", "BatchMode=yes", "-p"])
                .arg(host.port.to_string())
                .arg(host.destination())
                .arg(script)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| ExecError::Transport {
            host: host.name.clone(),
            message: format!("ssh timed out after {}s", self.config.timeout.as_secs()),
        })?
        .map_err(|e| ExecError::Transport {
            host: host.name.clone(),
            message: format!("failed to spawn {}: {e}", self.config.ssh_binary),
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        match output.status.code() {
            Some(0) => Ok(stdout),
            Some(SSH_TRANSPORT_EXIT) | None => Err(ExecError::Transport {
                host: host.name.clone(),
                message: stderr,
            }),
            Some(code) => Err(ExecError::NonZeroExit {
                host: host.name.clone(),
                command: script.to_string(),
                code,
                stderr,
            }),
        }
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &Host, commands: &[String]) -> ExecResult<Vec<String>> {
        let script = join_commands(commands);
        let mut attempt = 0;

        loop {
            match self.run_once(host, &script).await {
                Ok(stdout) => return Ok(split_output(&stdout, commands.len())),
                Err(e) if e.is_transport() && attempt < self.config.retries => {
                    attempt += 1;
                    tracing::warn!(
                        host = %host.name,
                        attempt,
                        "ssh transport failure, retrying: {e}"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Join commands into one script that stops at the first failure.
pub fn join_commands(commands: &[String]) -> String {
    let boundary = format!(" && printf '\\n%s\\n' '{SEPARATOR}' && ");
    commands
        .iter()
        .map(|c| format!("{{ {}\n}}", c.trim_end()))
        .collect::<Vec<_>>()
        .join(&boundary)
}

/// Split captured stdout back into one string per command.
pub fn split_output(stdout: &str, count: usize) -> Vec<String> {
    let marker = format!("\n{SEPARATOR}\n");
    let mut parts: Vec<String> = stdout.split(marker.as_str()).map(str::to_string).collect();
    parts.resize(count.max(1), String::new());
    parts
}

/// Quote a string for a POSIX shell.
///
/// Words made only of characters the shell treats literally are returned
/// as they are.
pub fn sh_quote(s: &str) -> String {
    let literal = |c: char| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c);
    if !s.is_empty() && s.chars().all(literal) {
        return s.to_string();
    }
    let mut out = String::from("'");
    out.push_str(&s.replace('\'', r"'\''"));
    out.push('\'');
    out
}
