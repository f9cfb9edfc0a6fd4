//! Job types for the lifecycle orchestrator.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

/// Status of a job as reported by its scheduler.
///
/// Scheduler-specific tokens are mapped onto these by each backend's parser.
/// `Finished` is the only terminal state; everything else keeps the job in
/// the polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Held and will not run until released.
    Held,
    /// Waiting in the queue.
    Queued,
    /// Running.
    Running,
    /// No longer known to the scheduler.
    Finished,
    /// Exiting after execution (PBS `E`).
    Exiting,
    /// Suspended.
    Suspended,
    /// Array job with at least one subjob running (PBS `B`).
    SubjobsRunning,
    /// Moved to another server (PBS `M`).
    Moved,
    /// Being moved to a new location (PBS `T`).
    Transit,
    /// Cycle-harvesting job suspended by keyboard activity (PBS `U`).
    CycleHarvestSuspended,
    /// Waiting for its start time (PBS `W`).
    WaitingForStart,
    /// Subjob completed or deleted (PBS `X`).
    SubjobCompleted,
    /// Cancelled (SLURM `CA`).
    Cancelled,
    /// Allocated resources are being configured (SLURM `CF`).
    Configuring,
    /// Completing (SLURM `CG`).
    Completing,
    /// Failed (SLURM `F`).
    Failed,
    /// Node failure (SLURM `NF`).
    NodeFailure,
    /// Preempted (SLURM `PR`).
    Preempted,
    /// Hit its time limit (SLURM `TO`).
    TimedOut,
    /// A token the parser did not recognise.
    Unknown(String),
}

impl JobStatus {
    /// Check if this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished)
    }

    /// Check if the job is running.
    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }

    /// Human-readable status name.
    pub fn name(&self) -> &str {
        match self {
            JobStatus::Held => "Held",
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Finished => "Finished",
            JobStatus::Exiting => "Exiting",
            JobStatus::Suspended => "Suspended",
            JobStatus::SubjobsRunning => "Subjob(s) running",
            JobStatus::Moved => "Job moved to server",
            JobStatus::Transit => "Job moved to new location",
            JobStatus::CycleHarvestSuspended => {
                "Cycle-harvesting job is suspended due to keyboard activity"
            }
            JobStatus::WaitingForStart => "Waiting for start time",
            JobStatus::SubjobCompleted => "Subjob completed execution/has been deleted",
            JobStatus::Cancelled => "Cancelled",
            JobStatus::Configuring => "Configuring",
            JobStatus::Completing => "Completing",
            JobStatus::Failed => "Failed",
            JobStatus::NodeFailure => "Node failure",
            JobStatus::Preempted => "Preempted",
            JobStatus::TimedOut => "Timed out",
            JobStatus::Unknown(token) => token,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a job is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JobPhase {
    /// Loaded from configuration.
    Unprepared,
    /// Submission script written.
    Prepared,
    /// Inputs uploaded.
    Staged,
    /// Accepted by the scheduler.
    Submitted,
    /// Left the queue, or abandoned after an error.
    Finished,
}

/// Wall-clock limit in hours, minutes and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Walltime {
    hours: u32,
    minutes: u32,
    seconds: u32,
}

impl Walltime {
    /// Parse `HH:MM` or `HH:MM:SS`.
    pub fn parse(s: &str) -> SchedResult<Self> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        let field = |p: &str| {
            p.parse::<u32>()
                .map_err(|_| SchedError::Configuration(format!("invalid maxtime '{s}'")))
        };
        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m] => (field(h)?, field(m)?, 0),
            [h, m, sec] => (field(h)?, field(m)?, field(sec)?),
            _ => {
                return Err(SchedError::Configuration(format!(
                    "invalid maxtime '{s}', expected HH:MM or HH:MM:SS"
                )));
            }
        };
        if minutes >= 60 || seconds >= 60 {
            return Err(SchedError::Configuration(format!(
                "invalid maxtime '{s}', minutes and seconds must be below 60"
            )));
        }
        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    /// `HH:MM:SS`, as used by PBS, SGE and SLURM.
    pub fn hms(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }

    /// `HH:MM`, as used by LSF. Seconds round up to the next minute.
    pub fn hm(&self) -> String {
        let mut hours = self.hours;
        let mut minutes = self.minutes + u32::from(self.seconds > 0);
        if minutes == 60 {
            hours += 1;
            minutes = 0;
        }
        format!("{hours:02}:{minutes:02}")
    }
}

impl Default for Walltime {
    fn default() -> Self {
        Self {
            hours: 24,
            minutes: 0,
            seconds: 0,
        }
    }
}

impl TryFrom<String> for Walltime {
    type Error = SchedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Walltime::parse(&value)
    }
}

impl From<Walltime> for String {
    fn from(value: Walltime) -> Self {
        value.hms()
    }
}

/// Resources requested from the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequest {
    /// Total cores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Node count; derived from cores when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<u32>,

    /// Cores per node; falls back to the host value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corespernode: Option<u32>,

    /// Memory per node in GB.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,

    /// Wall-clock limit.
    #[serde(default)]
    pub maxtime: Walltime,
}

fn default_frequency() -> u64 {
    300
}

fn default_batch() -> u32 {
    1
}

/// One unit of work targeting exactly one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job name, also used as the remote job directory name.
    pub name: String,

    /// Resource (host) name.
    pub resource: String,

    /// Scheduler job identifier, set once on submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jobid: Option<String>,

    /// Last observed status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub laststatus: Option<JobStatus>,

    /// Polling interval in seconds.
    #[serde(default = "default_frequency")]
    pub frequency: u64,

    /// Replicate count; above one submits an ensemble.
    #[serde(default = "default_batch")]
    pub batch: u32,

    /// Local working directory.
    #[serde(default)]
    pub localworkdir: PathBuf,

    /// Remote base working directory; the host value is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remoteworkdir: Option<String>,

    /// Queue or partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Account to charge; the host default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Resource request.
    #[serde(flatten)]
    pub resources: ResourceRequest,

    /// Comma-separated modules to load.
    #[serde(default)]
    pub modules: String,

    /// Command line run by the launcher.
    pub commandline: String,

    /// Generated submission script file name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subfile: Option<String>,

    /// Files staged to the remote working directory.
    #[serde(default)]
    pub filelist: Vec<String>,

    /// Set when the job was abandoned after an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the scheduler accepted the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,

    /// When the job was first seen as finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a job with default settings.
    pub fn new(
        name: impl Into<String>,
        resource: impl Into<String>,
        commandline: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            jobid: None,
            laststatus: None,
            frequency: default_frequency(),
            batch: default_batch(),
            localworkdir: PathBuf::from("."),
            remoteworkdir: None,
            queue: None,
            account: None,
            resources: ResourceRequest::default(),
            modules: String::new(),
            commandline: commandline.into(),
            subfile: None,
            filelist: Vec::new(),
            error: None,
            submitted_at: None,
            finished_at: None,
        }
    }

    /// Set the replicate count.
    pub fn with_batch(mut self, batch: u32) -> Self {
        self.batch = batch;
        self
    }

    /// Set the total core count.
    pub fn with_cores(mut self, cores: u32) -> Self {
        self.resources.cores = Some(cores);
        self
    }

    /// Set the cores per node.
    pub fn with_corespernode(mut self, cpn: u32) -> Self {
        self.resources.corespernode = Some(cpn);
        self
    }

    /// Set the wall-clock limit.
    pub fn with_maxtime(mut self, maxtime: Walltime) -> Self {
        self.resources.maxtime = maxtime;
        self
    }

    /// Set the polling interval in seconds.
    pub fn with_frequency(mut self, secs: u64) -> Self {
        self.frequency = secs;
        self
    }

    /// Set the local working directory.
    pub fn with_localworkdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.localworkdir = dir.into();
        self
    }

    /// Set the remote base working directory.
    pub fn with_remoteworkdir(mut self, dir: impl Into<String>) -> Self {
        self.remoteworkdir = Some(dir.into());
        self
    }

    /// Set the account.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Set the queue.
    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    /// Set the modules to load.
    pub fn with_modules(mut self, modules: impl Into<String>) -> Self {
        self.modules = modules.into();
        self
    }

    /// Check the invariants that do not depend on the host.
    pub fn validate(&self) -> SchedResult<()> {
        if self.name.trim().is_empty() {
            return Err(SchedError::Configuration("job name is empty".to_string()));
        }
        if self.batch == 0 {
            return Err(SchedError::Configuration(format!(
                "job {}: batch must be at least 1",
                self.name
            )));
        }
        if self.commandline.trim().is_empty() {
            return Err(SchedError::Configuration(format!(
                "job {}: commandline is empty",
                self.name
            )));
        }
        Ok(())
    }

    /// Individual module names, trimmed, empty entries dropped.
    pub fn module_list(&self) -> Vec<&str> {
        self.modules
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect()
    }

    /// Remote directory the job runs in: `<remoteworkdir>/<name>`.
    pub fn remote_dir(&self, host_workdir: Option<&str>) -> SchedResult<String> {
        let base = self
            .remoteworkdir
            .as_deref()
            .or(host_workdir)
            .ok_or_else(|| {
                SchedError::Configuration(format!(
                    "job {}: no remoteworkdir in job or host configuration",
                    self.name
                ))
            })?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), self.name))
    }

    /// Add a file to the staging list unless it is already there.
    pub fn add_stage_file(&mut self, file: impl Into<String>) {
        let file = file.into();
        if !self.filelist.contains(&file) {
            self.filelist.push(file);
        }
    }

    /// Whether the job is out of the polling loop.
    pub fn is_finished(&self) -> bool {
        self.laststatus.as_ref().is_some_and(JobStatus::is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(JobStatus::Finished.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(!JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Unknown("Z".into()).is_terminal());
    }

    #[test]
    fn test_walltime_parse() {
        let wt = Walltime::parse("24:00").unwrap();
        assert_eq!(wt.hms(), "24:00:00");
        assert_eq!(wt.hm(), "24:00");

        let wt = Walltime::parse("01:30:15").unwrap();
        assert_eq!(wt.hms(), "01:30:15");
        assert_eq!(wt.hm(), "01:31");

        let wt = Walltime::parse("0:59:30").unwrap();
        assert_eq!(wt.hm(), "01:00");

        assert!(Walltime::parse("24").is_err());
        assert!(Walltime::parse("1:75").is_err());
        assert!(Walltime::parse("a:b").is_err());
    }

    #[test]
    fn test_module_list() {
        let job = Job::new("j", "h", "pmemd").with_modules("amber, gcc ,,openmpi");
        assert_eq!(job.module_list(), ["amber", "gcc", "openmpi"]);
        assert!(Job::new("j", "h", "x").module_list().is_empty());
    }

    #[test]
    fn test_remote_dir() {
        let job = Job::new("md", "archer", "pmemd");
        assert_eq!(job.remote_dir(Some("/work/me/")).unwrap(), "/work/me/md");
        assert!(job.remote_dir(None).is_err());

        let job = job.with_remoteworkdir("/scratch");
        assert_eq!(job.remote_dir(Some("/work/me")).unwrap(), "/scratch/md");
    }

    #[test]
    fn test_add_stage_file_dedup() {
        let mut job = Job::new("md", "archer", "pmemd");
        job.add_stage_file("submit.pbs");
        job.add_stage_file("submit.pbs");
        assert_eq!(job.filelist, ["submit.pbs"]);
    }

    #[test]
    fn test_validate() {
        assert!(Job::new("md", "archer", "pmemd").validate().is_ok());
        assert!(Job::new("md", "archer", "pmemd").with_batch(0).validate().is_err());
        assert!(Job::new("md", "archer", " ").validate().is_err());
    }
}
