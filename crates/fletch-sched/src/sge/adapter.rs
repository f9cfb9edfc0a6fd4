//! SGE backend implementation.

use async_trait::async_trait;

use crate::backend::{
    SchedulerBackend, launcher, resolve_resources, run_delete, run_status, run_submit,
};
use crate::error::SchedResult;
use crate::executor::{RemoteExecutor, sh_quote};
use crate::host::{Host, SchedulerKind};
use crate::job::{Job, JobStatus};
use crate::sge::{parser, templates};

/// Backend for Grid Engine clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SgeBackend;

#[async_trait]
impl SchedulerBackend for SgeBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Sge
    }

    fn script_name(&self) -> &'static str {
        "submit.sge"
    }

    fn render_script(&self, host: &Host, job: &Job) -> SchedResult<String> {
        let res = resolve_resources(host, job)?;
        let launch = launcher(host, &res)?;
        Ok(templates::generate_sge_script(host, job, &res, &launch))
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
            format!("qsub {subfile}"),
            parser::parse_sge_qsub_output,
        )
        .await
    }

    async fn status(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<JobStatus> {
        // qstat without -u only lists the caller's jobs on some installs.
        let user = host
            .user
            .as_deref()
            .filter(|u| !u.is_empty())
            .map_or_else(|| "$USER".to_string(), sh_quote);
        run_status(
            executor,
            host,
            job_id,
            format!("qstat -u {user} | grep -w {}", sh_quote(job_id)),
            parser::parse_sge_qstat_output,
        )
        .await
    }

    async fn delete(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<String> {
        run_delete(executor, host, job_id, format!("qdel {}", sh_quote(job_id))).await
    }
}
