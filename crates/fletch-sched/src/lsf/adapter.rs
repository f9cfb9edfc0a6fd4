//! LSF backend implementation.

use async_trait::async_trait;

use crate::backend::{
    SchedulerBackend, launcher, resolve_resources, run_delete, run_status, run_submit,
};
use crate::error::SchedResult;
use crate::executor::{RemoteExecutor, sh_quote};
use crate::host::{Host, SchedulerKind};
use crate::job::{Job, JobStatus};
use crate::lsf::{parser, templates};

/// Backend for LSF clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LsfBackend;

#[async_trait]
impl SchedulerBackend for LsfBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Lsf
    }

    fn script_name(&self) -> &'static str {
        "submit.lsf"
    }

    fn render_script(&self, host: &Host, job: &Job) -> SchedResult<String> {
        let res = resolve_resources(host, job)?;
        let launch = launcher(host, &res)?;
        Ok(templates::generate_lsf_script(host, job, &res, &launch))
    }

    async fn submit(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job: &Job,
    ) -> SchedResult<String> {
        let subfile = job.subfile.as_deref().unwrap_or(self.script_name());
        run_submit(
            executor,
            host,
            job,
            format!("bsub < {subfile}"),
            parser::parse_bsub_output,
        )
        .await
    }

    async fn status(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<JobStatus> {
        run_status(
            executor,
            host,
            job_id,
            format!("bjobs | grep -w {}", sh_quote(job_id)),
            parser::parse_bjobs_output,
        )
        .await
    }

    async fn delete(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<String> {
        run_delete(executor, host, job_id, format!("bkill {}", sh_quote(job_id))).await
    }
}
