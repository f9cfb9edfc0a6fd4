//! SLURM backend implementation.

use async_trait::async_trait;

use crate::backend::{
    SchedulerBackend, launcher, resolve_resources, run_delete, run_status, run_submit,
};
use crate::error::SchedResult;
use crate::executor::{RemoteExecutor, sh_quote};
use crate::host::{Host, SchedulerKind};
use crate::job::{Job, JobStatus};
use crate::slurm::{parser, templates};

/// Backend for SLURM clusters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlurmBackend;

impl SlurmBackend {
    /// `squeue` restricted to the host's user when one is configured.
    fn squeue_command(host: &Host, job_id: &str) -> String {
        match host.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!(
                "squeue -u {} | grep -w {}",
                sh_quote(user),
                sh_quote(job_id)
            ),
            None => format!("squeue | grep -w {}", sh_quote(job_id)),
        }
    }
}

#[async_trait]
impl SchedulerBackend for SlurmBackend {
    fn kind(&self) -> SchedulerKind {
        SchedulerKind::Slurm
    }

    fn script_name(&self) -> &'static str {
        "submit.slurm"
    }

    fn render_script(&self, host: &Host, job: &Job) -> SchedResult<String> {
        let res = resolve_resources(host, job)?;
        let launch = launcher(host, &res)?;
        Ok(templates::generate_slurm_script(host, job, &res, &launch))
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
            format!("sbatch {subfile}"),
            parser::parse_sbatch_output,
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
            Self::squeue_command(host, job_id),
            parser::parse_squeue_output,
        )
        .await
    }

    async fn delete(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<String> {
        run_delete(executor, host, job_id, format!("scancel {}", sh_quote(job_id))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Host {
        Host::new("lumi", "lumi.csc.fi")
            .with_scheduler(SchedulerKind::Slurm)
            .with_handler("srun")
            .with_corespernode(128)
    }

    #[test]
    fn test_render_script() {
        let mut job = Job::new("md", "lumi", "gmx_mpi mdrun")
            .with_cores(256)
            .with_queue("standard")
            .with_account("project_462000");
        job.resources.memory = Some(200);
        let script = SlurmBackend.render_script(&host(), &job).unwrap();

        let expected = "\
#!/bin/bash --login
#SBATCH -J md
#SBATCH -p standard
#SBATCH -A project_462000
#SBATCH -n 256
#SBATCH -N 2
#SBATCH --mem=200G
#SBATCH -t 24:00:00

srun gmx_mpi mdrun
";
        assert_eq!(script, expected);
    }

    #[test]
    fn test_render_ensemble() {
        let job = Job::new("md", "lumi", "gmx_mpi mdrun")
            .with_cores(128)
            .with_batch(2);
        let script = SlurmBackend.render_script(&host(), &job).unwrap();
        assert!(script.contains("basedir=$SLURM_SUBMIT_DIR\nfor i in {1..2};\n"));
        assert!(script.contains("  srun gmx_mpi mdrun &\n"));
    }

    #[test]
    fn test_squeue_command() {
        assert_eq!(
            SlurmBackend::squeue_command(&host(), "42"),
            "squeue | grep -w 42"
        );
        assert_eq!(
            SlurmBackend::squeue_command(&host().with_user("jdoe"), "42"),
            "squeue -u jdoe | grep -w 42"
        );
    }
}
