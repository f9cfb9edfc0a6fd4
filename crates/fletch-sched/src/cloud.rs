//! Cloud placeholder backend.
//!
//! Has the same shape as the batch schedulers so the orchestrator never
//! special-cases it, but provisioning cloud instances is not implemented:
//! every operation fails with a configuration error.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::backend::SchedulerBackend;
use crate::error::{SchedError, SchedResult};
use crate::executor::RemoteExecutor;
use crate::host::{Host, SchedulerKind};
use crate::job::{Job, JobStatus};

/// Backend for hosts marked `CLOUD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudBackend;

fn unsupported(host: &Host, operation: &str) -> SchedError {
    SchedError::Configuration(format!(
        "host {} uses the cloud scheduler, which does not support {operation}",
        host.name
    ))
}

#[async_trait]
impl SchedulerBackend for CloudBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Cloud
    }

    fn script_name(&self) -> &'static str {
        "submit.cloud"
    }

    fn render_script(&self, host: &Host, _job: &Job) -> SchedResult<String> {
        Err(unsupported(host, "submission scripts"))
    }

    async fn prepare(&self, host: &Host, _job: &mut Job) -> SchedResult<PathBuf> {
        Err(unsupported(host, "prepare"))
    }

    async fn submit(
        &self,
        _executor: &dyn RemoteExecutor,
        host: &Host,
        _job: &Job,
    ) -> SchedResult<String> {
        Err(unsupported(host, "submit"))
    }

    async fn status(
        &self,
        _executor: &dyn RemoteExecutor,
        host: &Host,
        _job_id: &str,
    ) -> SchedResult<JobStatus> {
        Err(unsupported(host, "status"))
    }

    async fn delete(
        &self,
        _executor: &dyn RemoteExecutor,
        host: &Host,
        _job_id: &str,
    ) -> SchedResult<String> {
        Err(unsupported(host, "delete"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_prepare_rejected() {
        let host = Host::new("aws", "ec2.example.org").with_scheduler(SchedulerKind::Cloud);
        let mut job = Job::new("md", "aws", "pmemd");
        let err = CloudBackend.prepare(&host, &mut job).await.unwrap_err();
        assert!(matches!(err, SchedError::Configuration(_)));
        assert!(job.filelist.is_empty());
        assert!(job.subfile.is_none());
    }
}
