//! Scheduler backend contract and the logic shared by every backend.
//!
//! Each batch system gets one type implementing [`SchedulerBackend`]. The
//! orchestrator picks the implementation once from the host's
//! [`SchedulerKind`] via [`backend_for`] and keeps it next to the job, so no
//! call site branches on the scheduler kind.
//!
//! ```text
//!   prepare() ──→ submit() ──→ status() … status() ──→ Finished
//!   (local)       (remote)     (remote)                    │
//!                                  delete() ←── user cancel┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cloud::CloudBackend;
use crate::error::{SchedError, SchedResult};
use crate::executor::{ExecError, RemoteExecutor, sh_quote};
use crate::host::{Host, SchedulerKind};
use crate::job::{Job, JobStatus};
use crate::lsf::LsfBackend;
use crate::pbs::PbsBackend;
use crate::sge::SgeBackend;
use crate::slurm::SlurmBackend;

/// Uniform capability set over all batch schedulers.
#[async_trait]
pub trait SchedulerBackend: Send + Sync {
    /// Which scheduler this backend drives.
    fn kind(&self) -> SchedulerKind;

    /// File name of the generated submission script.
    fn script_name(&self) -> &'static str;

    /// Render the submission script for `job` on `host`.
    fn render_script(&self, host: &Host, job: &Job) -> SchedResult<String>;

    /// Write the submission script into the job's local working directory.
    ///
    /// Records the script as the job's submission file and adds it to the
    /// stage list once, so preparing twice does not duplicate it.
    async fn prepare(&self, host: &Host, job: &mut Job) -> SchedResult<PathBuf> {
        tracing::info!(job = %job.name, host = %host.name, "creating submit file");

        let script = self.render_script(host, job)?;
        tokio::fs::create_dir_all(&job.localworkdir).await?;
        let path = job.localworkdir.join(self.script_name());
        tokio::fs::write(&path, script).await?;

        job.add_stage_file(self.script_name());
        job.subfile = Some(self.script_name().to_string());

        tracing::debug!(job = %job.name, path = %path.display(), "submit file written");
        Ok(path)
    }

    /// Submit the prepared script and return the scheduler job identifier.
    async fn submit(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job: &Job,
    ) -> SchedResult<String>;

    /// Query the status of a submitted job.
    ///
    /// A query that fails because the job is no longer listed yields
    /// [`JobStatus::Finished`]; only transport failures are errors.
    async fn status(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<JobStatus>;

    /// Cancel a job and return the raw command output.
    async fn delete(
        &self,
        executor: &dyn RemoteExecutor,
        host: &Host,
        job_id: &str,
    ) -> SchedResult<String>;
}

/// Get the backend implementation for a scheduler kind.
pub fn backend_for(kind: SchedulerKind) -> Arc<dyn SchedulerBackend> {
    match kind {
        SchedulerKind::Pbs => Arc::new(PbsBackend),
        SchedulerKind::Lsf => Arc::new(LsfBackend),
        SchedulerKind::Sge => Arc::new(SgeBackend),
        SchedulerKind::Slurm => Arc::new(SlurmBackend),
        SchedulerKind::Cloud => Arc::new(CloudBackend),
    }
}

/// Core and node counts after applying job and host defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedResources {
    /// Total cores.
    pub cores: u32,
    /// Node count.
    pub nodes: u32,
    /// Cores per node.
    pub corespernode: u32,
}

/// Number of nodes needed for `cores`, rounded up.
pub fn node_count(cores: u32, corespernode: u32) -> u32 {
    cores.div_ceil(corespernode)
}

/// Resolve the resource request of `job` against `host` defaults.
pub fn resolve_resources(host: &Host, job: &Job) -> SchedResult<ResolvedResources> {
    let corespernode = job
        .resources
        .corespernode
        .or(host.corespernode)
        .ok_or_else(|| {
            SchedError::Configuration(format!(
                "job {}: corespernode is set in neither the job nor host {}",
                job.name, host.name
            ))
        })?;
    if corespernode == 0 {
        return Err(SchedError::Configuration(format!(
            "job {}: corespernode must be positive",
            job.name
        )));
    }

    let cores = job.resources.cores.or(host.cores);
    let (cores, nodes) = match (job.resources.nodes, cores) {
        (Some(nodes), Some(cores)) => (cores, nodes),
        (Some(nodes), None) => {
            let cores = nodes.checked_mul(corespernode).ok_or_else(|| {
                SchedError::Configuration(format!("job {}: core count overflows", job.name))
            })?;
            (cores, nodes)
        }
        (None, Some(cores)) => (cores, node_count(cores, corespernode)),
        (None, None) => {
            return Err(SchedError::Configuration(format!(
                "job {}: cores is set in neither the job nor host {}",
                job.name, host.name
            )));
        }
    };
    if cores == 0 || nodes == 0 {
        return Err(SchedError::Configuration(format!(
            "job {}: cores and nodes must be positive",
            job.name
        )));
    }

    Ok(ResolvedResources {
        cores,
        nodes,
        corespernode,
    })
}

/// Account directive, e.g. `#PBS -A e280`.
///
/// The job's account wins over the host default. A host `accountflag`
/// replaces the scheduler's `default_flag`.
pub fn account_directive(
    prefix: &str,
    default_flag: &str,
    host: &Host,
    job: &Job,
) -> Option<String> {
    let account = job
        .account
        .as_deref()
        .filter(|a| !a.is_empty())
        .or_else(|| host.account.as_deref().filter(|a| !a.is_empty()))?;
    let flag = host
        .accountflag
        .as_deref()
        .filter(|f| !f.is_empty())
        .unwrap_or(default_flag);
    Some(format!("{prefix} {flag} {account}"))
}

/// Launcher prefix for the execution line.
///
/// Cray's `aprun` needs the placement spelled out; other launchers take
/// their layout from the scheduler allocation.
pub fn launcher(host: &Host, res: &ResolvedResources) -> SchedResult<String> {
    let handler = host
        .handler
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| {
            SchedError::Configuration(format!(
                "no launcher (handler) known for host {}; set one or run detection",
                host.name
            ))
        })?;

    if handler == "aprun" {
        Ok(format!("aprun -n {} -N {}", res.cores, res.corespernode))
    } else {
        Ok(handler.to_string())
    }
}

/// `module load` lines followed by a blank line, or nothing.
pub fn module_lines(job: &Job) -> Vec<String> {
    let mut lines: Vec<String> = job
        .module_list()
        .into_iter()
        .map(|m| format!("module load {m}"))
        .collect();
    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// Execution section: one launcher line, or an ensemble loop over `rep<i>`.
///
/// `basedir` is the shell expression for the job's remote directory inside
/// the running script.
pub fn execution_lines(launch: &str, job: &Job, basedir: &str) -> Vec<String> {
    if job.batch <= 1 {
        return vec![format!("{launch} {}", job.commandline)];
    }

    vec![
        format!("basedir={basedir}"),
        format!("for i in {{1..{}}};", job.batch),
        "do".to_string(),
        "  cd $basedir/rep$i/".to_string(),
        format!("  {launch} {} &", job.commandline),
        "done".to_string(),
        "wait".to_string(),
    ]
}

/// Join script lines with a trailing newline.
pub fn finish_script(lines: Vec<String>) -> String {
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// The command list for a submission: change into the job directory, submit.
pub fn submit_commands(host: &Host, job: &Job, submit: String) -> SchedResult<Vec<String>> {
    let remote_dir = job.remote_dir(host.remoteworkdir.as_deref())?;
    Ok(vec![format!("cd {}", sh_quote(&remote_dir)), submit])
}

/// Run a submission and extract the job identifier with `parse`.
pub async fn run_submit(
    executor: &dyn RemoteExecutor,
    host: &Host,
    job: &Job,
    submit: String,
    parse: fn(&str) -> Option<String>,
) -> SchedResult<String> {
    let subfile = job.subfile.as_deref().ok_or_else(|| SchedError::Submission {
        job: job.name.clone(),
        host: host.name.clone(),
        command: submit.clone(),
        message: "job has not been prepared".to_string(),
    })?;
    tracing::info!(job = %job.name, host = %host.name, subfile, "submitting job");

    let commands = submit_commands(host, job, submit.clone())?;
    let output = executor
        .run(host, &commands)
        .await
        .map_err(|e| SchedError::Submission {
            job: job.name.clone(),
            host: host.name.clone(),
            command: submit.clone(),
            message: e.to_string(),
        })?;

    let stdout = output.last().map(String::as_str).unwrap_or_default();
    let job_id = parse(stdout).ok_or_else(|| SchedError::Submission {
        job: job.name.clone(),
        host: host.name.clone(),
        command: submit.clone(),
        message: format!("could not find a job id in output: {}", stdout.trim()),
    })?;

    tracing::info!(job = %job.name, host = %host.name, %job_id, "job submitted");
    Ok(job_id)
}

/// Run a status query and classify its output with `parse`.
///
/// A non-zero exit (the filter found no row) means the job left the queue.
pub async fn run_status(
    executor: &dyn RemoteExecutor,
    host: &Host,
    job_id: &str,
    query: String,
    parse: fn(&str, &str) -> JobStatus,
) -> SchedResult<JobStatus> {
    match executor.run(host, &[query]).await {
        Ok(output) => Ok(parse(
            output.first().map(String::as_str).unwrap_or_default(),
            job_id,
        )),
        Err(ExecError::NonZeroExit { .. }) => Ok(JobStatus::Finished),
        Err(e) => Err(SchedError::StatusQuery {
            job_id: job_id.to_string(),
            host: host.name.clone(),
            message: e.to_string(),
        }),
    }
}

/// Run a cancel command and return its output.
pub async fn run_delete(
    executor: &dyn RemoteExecutor,
    host: &Host,
    job_id: &str,
    command: String,
) -> SchedResult<String> {
    tracing::info!(host = %host.name, job_id, "deleting job");
    let output = executor
        .run(host, &[command])
        .await
        .map_err(|e| SchedError::JobDelete {
            job_id: job_id.to_string(),
            host: host.name.clone(),
            message: e.to_string(),
        })?;
    tracing::info!(host = %host.name, job_id, "deletion successful");
    Ok(output.into_iter().next().unwrap_or_default())
}

/// Whitespace-split row of a listing whose first column is `job_id`.
///
/// Accepts server suffixes (`12345.sdb`) and array suffixes (`12345_3`,
/// `12345[1]`) so a grep-style filter never matches a longer id.
pub fn find_row<'a>(output: &'a str, job_id: &str) -> Option<Vec<&'a str>> {
    output
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|cols| {
            cols.first().is_some_and(|first| {
                first
                    .strip_prefix(job_id)
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with(['.', '_', '[']))
            })
        })
}

/// Status token at `column` of the job's row, mapped with `map`.
///
/// No row means the job has left the queue.
pub fn status_from_column(
    output: &str,
    job_id: &str,
    column: usize,
    map: fn(&str) -> JobStatus,
) -> JobStatus {
    match find_row(output, job_id) {
        None => JobStatus::Finished,
        Some(cols) => match cols.get(column) {
            Some(token) => map(token),
            None => JobStatus::Unknown(cols.join(" ")),
        },
    }
}

/// Leading run of ASCII digits of `s`.
pub fn leading_digits(s: &str) -> Option<&str> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Walltime;

    fn host() -> Host {
        Host::new("archer", "login.archer.ac.uk")
            .with_handler("mpirun")
            .with_corespernode(24)
    }

    #[test]
    fn test_node_count_rounding() {
        assert_eq!(node_count(24, 10), 3);
        assert_eq!(node_count(24, 12), 2);
        assert_eq!(node_count(1, 24), 1);
    }

    #[test]
    fn test_resolve_from_job() {
        let job = Job::new("md", "archer", "pmemd")
            .with_cores(24)
            .with_corespernode(10);
        let res = resolve_resources(&host(), &job).unwrap();
        assert_eq!(
            res,
            ResolvedResources {
                cores: 24,
                nodes: 3,
                corespernode: 10
            }
        );
    }

    #[test]
    fn test_resolve_falls_back_to_host() {
        let mut h = host();
        h.cores = Some(48);
        let job = Job::new("md", "archer", "pmemd");
        let res = resolve_resources(&h, &job).unwrap();
        assert_eq!(res.nodes, 2);
        assert_eq!(res.cores, 48);
    }

    #[test]
    fn test_resolve_explicit_nodes() {
        let mut job = Job::new("md", "archer", "pmemd");
        job.resources.nodes = Some(4);
        let res = resolve_resources(&host(), &job).unwrap();
        assert_eq!(res.nodes, 4);
        assert_eq!(res.cores, 96);
    }

    #[test]
    fn test_resolve_missing_values() {
        let job = Job::new("md", "archer", "pmemd").with_cores(24);
        let bare = Host::new("archer", "login");
        assert!(matches!(
            resolve_resources(&bare, &job),
            Err(SchedError::Configuration(_))
        ));

        let job = Job::new("md", "archer", "pmemd");
        assert!(matches!(
            resolve_resources(&host(), &job),
            Err(SchedError::Configuration(_))
        ));

        let job = Job::new("md", "archer", "pmemd")
            .with_cores(24)
            .with_corespernode(0);
        assert!(resolve_resources(&host(), &job).is_err());
    }

    #[test]
    fn test_account_directive_selection() {
        let job = Job::new("md", "archer", "pmemd").with_account("job-acct");
        let h = host().with_account("host-acct");
        assert_eq!(
            account_directive("#PBS", "-A", &h, &job).as_deref(),
            Some("#PBS -A job-acct")
        );

        let job = Job::new("md", "archer", "pmemd");
        assert_eq!(
            account_directive("#PBS", "-A", &h, &job).as_deref(),
            Some("#PBS -A host-acct")
        );

        let mut h = h;
        h.accountflag = Some("-P".to_string());
        assert_eq!(
            account_directive("#PBS", "-A", &h, &job).as_deref(),
            Some("#PBS -P host-acct")
        );

        assert_eq!(account_directive("#PBS", "-A", &host(), &job), None);
    }

    #[test]
    fn test_launcher() {
        let res = ResolvedResources {
            cores: 48,
            nodes: 2,
            corespernode: 24,
        };
        assert_eq!(launcher(&host(), &res).unwrap(), "mpirun");
        let cray = host().with_handler("aprun");
        assert_eq!(launcher(&cray, &res).unwrap(), "aprun -n 48 -N 24");
        let bare = Host::new("archer", "login");
        assert!(launcher(&bare, &res).is_err());
    }

    #[test]
    fn test_execution_lines() {
        let job = Job::new("md", "archer", "pmemd -O").with_maxtime(Walltime::default());
        assert_eq!(execution_lines("mpirun", &job, "$PWD"), ["mpirun pmemd -O"]);

        let job = job.with_batch(3);
        let lines = execution_lines("mpirun", &job, "$PBS_O_WORKDIR");
        assert_eq!(lines[0], "basedir=$PBS_O_WORKDIR");
        assert_eq!(lines[1], "for i in {1..3};");
        assert_eq!(lines[4], "  mpirun pmemd -O &");
        assert_eq!(lines.last().map(String::as_str), Some("wait"));
    }

    #[test]
    fn test_find_row() {
        let listing = "123456.sdb  other  me 00:00:00 R q\n12345.sdb  md  me 00:01:00 Q q\n";
        let row = find_row(listing, "12345").unwrap();
        assert_eq!(row[1], "md");
        assert!(find_row(listing, "1234").is_none());
        assert!(find_row("", "1").is_none());
        assert!(find_row("12345_[1-4] part md me PD", "12345").is_some());
    }

    #[test]
    fn test_leading_digits() {
        assert_eq!(leading_digits("12345.sdb"), Some("12345"));
        assert_eq!(leading_digits("abc"), None);
        assert_eq!(leading_digits("42"), Some("42"));
    }
}
