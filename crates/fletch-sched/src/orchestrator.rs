//! Job lifecycle orchestration.
//!
//! The [`Orchestrator`] drives every job through detect → prepare → stage →
//! submit → poll. Each job is bound once to the [`SchedulerBackend`] of its
//! host; a failure on one job is logged, recorded on the job and never stops
//! its siblings.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::backend::{SchedulerBackend, backend_for};
use crate::config::HostStore;
use crate::detect::{DetectionReport, EnvironmentDetector, ProbePolicy};
use crate::error::{SchedError, SchedResult};
use crate::executor::RemoteExecutor;
use crate::host::{Host, Hosts};
use crate::job::{Job, JobPhase, JobStatus};
use crate::staging::Stager;

/// Collaborators shared by every lifecycle step.
#[derive(Clone)]
pub struct RunContext {
    /// Runs commands on remote hosts.
    pub executor: Arc<dyn RemoteExecutor>,
    /// Moves job files.
    pub stager: Arc<dyn Stager>,
    /// Persists detected host settings.
    pub store: Arc<dyn HostStore>,
}

impl RunContext {
    /// Bundle the collaborators.
    pub fn new(
        executor: Arc<dyn RemoteExecutor>,
        stager: Arc<dyn Stager>,
        store: Arc<dyn HostStore>,
    ) -> Self {
        Self {
            executor,
            stager,
            store,
        }
    }
}

/// Poll loop settings.
#[derive(Debug, Clone, Default)]
pub struct MonitorConfig {
    /// Give up after this long. `None` waits until every job finishes.
    pub max_wait: Option<Duration>,
}

/// A job together with the backend it was bound to.
pub struct TrackedJob {
    /// The job record.
    pub job: Job,
    /// Lifecycle phase.
    pub phase: JobPhase,
    backend: Option<Arc<dyn SchedulerBackend>>,
}

impl TrackedJob {
    fn new(job: Job) -> Self {
        // A job loaded with an id is already in the scheduler's hands.
        let phase = if job.is_finished() {
            JobPhase::Finished
        } else if job.jobid.is_some() {
            JobPhase::Submitted
        } else {
            JobPhase::Unprepared
        };
        Self {
            job,
            phase,
            backend: None,
        }
    }

    /// Whether the poll loop still has to watch this job.
    pub fn is_pending(&self) -> bool {
        self.phase == JobPhase::Submitted
    }
}

/// Final state of one job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    /// Job name.
    pub name: String,
    /// Resource the job ran on.
    pub resource: String,
    /// Scheduler job identifier.
    pub jobid: Option<String>,
    /// Lifecycle phase reached.
    pub phase: JobPhase,
    /// Last observed status.
    pub status: Option<JobStatus>,
    /// Error that ended the job early.
    pub error: Option<String>,
}

/// Result of a monitoring run.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorReport {
    /// Number of polling passes made.
    pub passes: u32,
    /// Per-job outcome in registration order.
    pub jobs: Vec<JobOutcome>,
}

impl MonitorReport {
    /// Jobs that ended with an error.
    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.jobs.iter().filter(|j| j.error.is_some())
    }
}

/// Drives many jobs on many hosts through their lifecycle.
pub struct Orchestrator {
    ctx: RunContext,
    hosts: Hosts,
    jobs: Vec<TrackedJob>,
    config: MonitorConfig,
    probe_policy: ProbePolicy,
}

impl Orchestrator {
    /// Create an orchestrator for `jobs`, kept in the given order.
    pub fn new(ctx: RunContext, hosts: Hosts, jobs: Vec<Job>) -> Self {
        Self {
            ctx,
            hosts,
            jobs: jobs.into_iter().map(TrackedJob::new).collect(),
            config: MonitorConfig::default(),
            probe_policy: ProbePolicy::default(),
        }
    }

    /// Set the poll loop configuration.
    pub fn with_monitor_config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set how detection evaluates its probe tables.
    pub fn with_probe_policy(mut self, policy: ProbePolicy) -> Self {
        self.probe_policy = policy;
        self
    }

    /// Host registry, including detected values.
    pub fn hosts(&self) -> &Hosts {
        &self.hosts
    }

    /// Tracked jobs in registration order.
    pub fn jobs(&self) -> &[TrackedJob] {
        &self.jobs
    }

    /// Fill in the scheduler and launcher of every host a job uses.
    ///
    /// Hosts are saved once when anything was detected. Only transport
    /// failures are errors.
    pub async fn detect(&mut self) -> SchedResult<Vec<DetectionReport>> {
        let detector =
            EnvironmentDetector::new(self.ctx.executor.as_ref()).with_policy(self.probe_policy);
        let resources = self.jobs.iter().map(|t| t.job.resource.as_str());
        detector
            .detect_all(&mut self.hosts, resources, self.ctx.store.as_ref())
            .await
    }

    /// Write the submission script of every unprepared job.
    ///
    /// Returns the per-job failures; the failed jobs are finished with an
    /// error and the rest stay prepared.
    pub async fn prepare_all(&mut self) -> Vec<SchedError> {
        let mut failures = Vec::new();
        for tracked in self.jobs.iter_mut() {
            if tracked.phase != JobPhase::Unprepared {
                continue;
            }
            let result = match bind(&self.hosts, tracked) {
                Ok((host, backend)) => match tracked.job.validate() {
                    Ok(()) => backend.prepare(host, &mut tracked.job).await,
                    Err(e) => Err(e),
                },
                Err(e) => Err(e),
            };
            match result {
                Ok(path) => {
                    tracing::debug!(job = %tracked.job.name, path = %path.display(), "job prepared");
                    tracked.phase = JobPhase::Prepared;
                }
                Err(e) => failures.push(fail(tracked, e)),
            }
        }
        failures
    }

    /// Upload the working directory of every prepared job.
    pub async fn stage_all(&mut self) -> Vec<SchedError> {
        let mut failures = Vec::new();
        for tracked in self.jobs.iter_mut() {
            if tracked.phase != JobPhase::Prepared {
                continue;
            }
            let result = match bind(&self.hosts, tracked) {
                Ok((host, _)) => stage(self.ctx.stager.as_ref(), host, &tracked.job).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => tracked.phase = JobPhase::Staged,
                Err(e) => failures.push(fail(tracked, e)),
            }
        }
        failures
    }

    /// Submit every prepared or staged job that has no identifier yet.
    pub async fn submit_all(&mut self) -> Vec<SchedError> {
        let mut failures = Vec::new();
        for tracked in self.jobs.iter_mut() {
            if !matches!(tracked.phase, JobPhase::Prepared | JobPhase::Staged)
                || tracked.job.jobid.is_some()
            {
                continue;
            }
            let result = match bind(&self.hosts, tracked) {
                Ok((host, backend)) => {
                    backend
                        .submit(self.ctx.executor.as_ref(), host, &tracked.job)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(job_id) => {
                    tracked.job.jobid = Some(job_id);
                    tracked.job.submitted_at = Some(chrono::Utc::now());
                    tracked.phase = JobPhase::Submitted;
                }
                Err(e) => failures.push(fail(tracked, e)),
            }
        }
        failures
    }

    /// Poll every submitted job until all have finished.
    ///
    /// One pass queries the jobs in registration order, then the loop sleeps
    /// for the largest `frequency` among them. A transition into `Running`
    /// pulls partial results, `Finished` pulls the final ones. A failed
    /// status query finishes that job with an error.
    pub async fn monitor(&mut self) -> SchedResult<MonitorReport> {
        let interval = self.poll_interval();
        let start = Instant::now();
        let mut passes = 0;

        if self.jobs.iter().any(TrackedJob::is_pending) {
            tracing::info!(interval_secs = interval.as_secs(), "monitoring jobs");
        }

        while self.jobs.iter().any(TrackedJob::is_pending) {
            passes += 1;
            self.poll_once().await;

            let remaining = self.jobs.iter().filter(|t| t.is_pending()).count();
            if remaining == 0 {
                break;
            }
            if let Some(max_wait) = self.config.max_wait {
                if start.elapsed() >= max_wait {
                    return Err(SchedError::Timeout(format!(
                        "{remaining} job(s) still in the queue after {}s",
                        max_wait.as_secs()
                    )));
                }
            }
            tracing::debug!(remaining, "waiting for next poll");
            tokio::time::sleep(interval).await;
        }

        tracing::info!(passes, "all jobs finished");
        Ok(self.report(passes))
    }

    /// Cancel every job the scheduler still holds.
    pub async fn delete_all(&mut self) -> Vec<SchedError> {
        let mut failures = Vec::new();
        for tracked in self.jobs.iter_mut() {
            if !tracked.is_pending() {
                continue;
            }
            let Some(job_id) = tracked.job.jobid.clone() else {
                continue;
            };
            let result = match bind(&self.hosts, tracked) {
                Ok((host, backend)) => {
                    backend
                        .delete(self.ctx.executor.as_ref(), host, &job_id)
                        .await
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(_) => {
                    tracked.job.laststatus = Some(JobStatus::Finished);
                    tracked.job.finished_at = Some(chrono::Utc::now());
                    tracked.phase = JobPhase::Finished;
                }
                Err(e) => {
                    tracing::error!(job = %tracked.job.name, %job_id, error = %e, "delete failed");
                    failures.push(e);
                }
            }
        }
        failures
    }

    /// Run the full lifecycle: detect, prepare, stage, submit and monitor.
    ///
    /// Per-job failures are recorded in the report. Transport failures while
    /// detecting and the poll timeout end the run with an error.
    pub async fn run(&mut self) -> SchedResult<MonitorReport> {
        self.detect().await?;
        self.prepare_all().await;
        self.stage_all().await;
        self.submit_all().await;
        self.monitor().await
    }

    /// Query one job outside the poll loop.
    pub async fn query_status(&self, resource: &str, job_id: &str) -> SchedResult<JobStatus> {
        let (host, backend) = self.backend_for_resource(resource)?;
        backend
            .status(self.ctx.executor.as_ref(), host, job_id)
            .await
    }

    /// Cancel one job outside the poll loop.
    pub async fn delete_job(&self, resource: &str, job_id: &str) -> SchedResult<String> {
        let (host, backend) = self.backend_for_resource(resource)?;
        backend
            .delete(self.ctx.executor.as_ref(), host, job_id)
            .await
    }

    /// Snapshot of every job's outcome.
    pub fn report(&self, passes: u32) -> MonitorReport {
        MonitorReport {
            passes,
            jobs: self
                .jobs
                .iter()
                .map(|t| JobOutcome {
                    name: t.job.name.clone(),
                    resource: t.job.resource.clone(),
                    jobid: t.job.jobid.clone(),
                    phase: t.phase,
                    status: t.job.laststatus.clone(),
                    error: t.job.error.clone(),
                })
                .collect(),
        }
    }

    fn backend_for_resource(
        &self,
        resource: &str,
    ) -> SchedResult<(&Host, Arc<dyn SchedulerBackend>)> {
        let host = self
            .hosts
            .get(resource)
            .ok_or_else(|| SchedError::Configuration(format!("unknown resource {resource}")))?;
        let kind = host.scheduler.ok_or_else(|| SchedError::SchedulerUnset {
            host: host.name.clone(),
        })?;
        Ok((host, backend_for(kind)))
    }

    /// Shared cadence: the largest frequency among jobs still being watched.
    fn poll_interval(&self) -> Duration {
        let secs = self
            .jobs
            .iter()
            .filter(|t| t.is_pending())
            .map(|t| t.job.frequency)
            .max()
            .unwrap_or(0);
        Duration::from_secs(secs.max(1))
    }

    async fn poll_once(&mut self) {
        let executor = self.ctx.executor.as_ref();
        let stager = self.ctx.stager.as_ref();

        for tracked in self.jobs.iter_mut() {
            if !tracked.is_pending() {
                continue;
            }
            let Some(job_id) = tracked.job.jobid.clone() else {
                continue;
            };
            let (host, backend) = match bind(&self.hosts, tracked) {
                Ok(bound) => bound,
                Err(e) => {
                    fail(tracked, e);
                    continue;
                }
            };

            match backend.status(executor, host, &job_id).await {
                Ok(status) => observe(stager, host, tracked, status).await,
                Err(e) => {
                    fail(tracked, e);
                }
            }
        }
    }
}

/// Resolve the host and backend of a job, binding the backend on first use.
fn bind<'h>(
    hosts: &'h Hosts,
    tracked: &mut TrackedJob,
) -> SchedResult<(&'h Host, Arc<dyn SchedulerBackend>)> {
    let host = hosts
        .get(&tracked.job.resource)
        .ok_or_else(|| SchedError::UnknownResource {
            job: tracked.job.name.clone(),
            resource: tracked.job.resource.clone(),
        })?;
    let backend = match &tracked.backend {
        Some(backend) => Arc::clone(backend),
        None => {
            let kind = host.scheduler.ok_or_else(|| SchedError::SchedulerUnset {
                host: host.name.clone(),
            })?;
            let backend = backend_for(kind);
            tracing::debug!(
                job = %tracked.job.name,
                host = %host.name,
                scheduler = %backend.kind(),
                "bound job to backend"
            );
            tracked.backend = Some(Arc::clone(&backend));
            backend
        }
    };
    Ok((host, backend))
}

async fn stage(stager: &dyn Stager, host: &Host, job: &Job) -> SchedResult<()> {
    let remote_dir = job.remote_dir(host.remoteworkdir.as_deref())?;
    tracing::info!(job = %job.name, host = %host.name, %remote_dir, "staging job files");
    stager
        .upload(host, &job.localworkdir, &remote_dir, &job.filelist)
        .await
        .map_err(|e| attach_job(e, &job.name))
}

/// Record a newly observed status and fire the staging hooks.
async fn observe(stager: &dyn Stager, host: &Host, tracked: &mut TrackedJob, status: JobStatus) {
    let job = &mut tracked.job;
    if job.laststatus.as_ref() != Some(&status) {
        tracing::info!(
            job = %job.name,
            host = %host.name,
            from = job.laststatus.as_ref().map_or("-", JobStatus::name),
            to = %status,
            "status changed"
        );
        let started = status.is_running();
        job.laststatus = Some(status);

        if started {
            if let Err(e) = download(stager, host, job, false).await {
                tracing::warn!(job = %job.name, host = %host.name, error = %e, "incremental download failed");
            }
        }
    }

    if job.is_finished() {
        job.finished_at = Some(chrono::Utc::now());
        tracked.phase = JobPhase::Finished;
        if let Err(e) = download(stager, host, job, true).await {
            tracing::error!(job = %job.name, host = %host.name, error = %e, "final download failed");
            job.error = Some(e.to_string());
        }
    }
}

async fn download(stager: &dyn Stager, host: &Host, job: &Job, last: bool) -> SchedResult<()> {
    let remote_dir = job.remote_dir(host.remoteworkdir.as_deref())?;
    let result = if last {
        stager
            .download_final(host, &job.localworkdir, &remote_dir)
            .await
    } else {
        stager
            .download_incremental(host, &job.localworkdir, &remote_dir)
            .await
    };
    result.map_err(|e| attach_job(e, &job.name))
}

/// Finish a job with an error, logging it with its context.
fn fail(tracked: &mut TrackedJob, error: SchedError) -> SchedError {
    let job = &mut tracked.job;
    tracing::error!(job = %job.name, host = %job.resource, error = %error, "job failed");
    job.error = Some(error.to_string());
    if tracked.phase == JobPhase::Submitted {
        job.laststatus = Some(JobStatus::Finished);
        job.finished_at = Some(chrono::Utc::now());
    }
    tracked.phase = JobPhase::Finished;
    error
}

fn attach_job(error: SchedError, name: &str) -> SchedError {
    match error {
        SchedError::Staging { job, host, message } if job.is_empty() => SchedError::Staging {
            job: name.to_string(),
            host,
            message,
        },
        other => other,
    }
}
