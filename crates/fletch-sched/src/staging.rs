//! File staging between the local and remote job directories.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{SchedError, SchedResult};
use crate::executor::{RemoteExecutor, sh_quote};
use crate::host::Host;

/// Moves job inputs up and results down.
///
/// The orchestrator calls `upload` once the script is prepared,
/// `download_incremental` when a job starts running and `download_final`
/// when it finishes.
#[async_trait]
pub trait Stager: Send + Sync {
    /// Upload the job directory, checking that every listed file exists.
    async fn upload(
        &self,
        host: &Host,
        local_dir: &Path,
        remote_dir: &str,
        files: &[String],
    ) -> SchedResult<()>;

    /// Pull down partial results while the job runs.
    async fn download_incremental(
        &self,
        host: &Host,
        local_dir: &Path,
        remote_dir: &str,
    ) -> SchedResult<()>;

    /// Pull down the final results.
    async fn download_final(&self, host: &Host, local_dir: &Path, remote_dir: &str)
    -> SchedResult<()>;
}

/// Stager that does nothing; used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStager;

#[async_trait]
impl Stager for NoopStager {
    async fn upload(&self, _: &Host, _: &Path, _: &str, _: &[String]) -> SchedResult<()> {
        Ok(())
    }

    async fn download_incremental(&self, _: &Host, _: &Path, _: &str) -> SchedResult<()> {
        Ok(())
    }

    async fn download_final(&self, _: &Host, _: &Path, _: &str) -> SchedResult<()> {
        Ok(())
    }
}

/// [`Stager`] using `rsync` over ssh.
pub struct RsyncStager<E> {
    executor: E,
    rsync_binary: String,
    timeout: Duration,
}

impl<E: RemoteExecutor> RsyncStager<E> {
    /// Create a stager. The executor is used to create remote directories.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            rsync_binary: "rsync".to_string(),
            timeout: Duration::from_secs(3600),
        }
    }

    /// Override the transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn rsync(&self, host: &Host, src: &str, dst: &str) -> SchedResult<()> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.rsync_binary)
                .args(["-az", "-e"])
                .arg(format!("ssh -o BatchMode=yes -p {}", host.port))
                .arg(src)
                .arg(dst)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| SchedError::Timeout(format!("rsync {src} -> {dst}")))?
        .map_err(|e| staging_error(host, format!("failed to spawn rsync: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(staging_error(host, stderr.trim().to_string()));
        }
        Ok(())
    }

    async fn pull(&self, host: &Host, local_dir: &Path, remote_dir: &str) -> SchedResult<()> {
        tokio::fs::create_dir_all(local_dir).await?;
        let src = format!("{}:{}/", host.destination(), remote_dir);
        let dst = format!("{}/", local_dir.display());
        self.rsync(host, &src, &dst).await
    }
}

fn staging_error(host: &Host, message: String) -> SchedError {
    SchedError::Staging {
        job: String::new(),
        host: host.name.clone(),
        message,
    }
}

#[async_trait]
impl<E: RemoteExecutor> Stager for RsyncStager<E> {
    async fn upload(
        &self,
        host: &Host,
        local_dir: &Path,
        remote_dir: &str,
        files: &[String],
    ) -> SchedResult<()> {
        for file in files {
            if !local_dir.join(file).exists() {
                return Err(staging_error(
                    host,
                    format!("{} is missing from {}", file, local_dir.display()),
                ));
            }
        }

        self.executor
            .run(host, &[format!("mkdir -p {}", sh_quote(remote_dir))])
            .await?;

        let src = format!("{}/", local_dir.display());
        let dst = format!("{}:{}/", host.destination(), remote_dir);
        tracing::debug!(host = %host.name, %src, %dst, "uploading job directory");
        self.rsync(host, &src, &dst).await
    }

    async fn download_incremental(
        &self,
        host: &Host,
        local_dir: &Path,
        remote_dir: &str,
    ) -> SchedResult<()> {
        tracing::debug!(host = %host.name, remote_dir, "incremental download");
        self.pull(host, local_dir, remote_dir).await
    }

    async fn download_final(
        &self,
        host: &Host,
        local_dir: &Path,
        remote_dir: &str,
    ) -> SchedResult<()> {
        tracing::info!(host = %host.name, remote_dir, "downloading final results");
        self.pull(host, local_dir, remote_dir).await
    }
}
