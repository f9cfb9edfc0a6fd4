//! Environment detection for unconfigured hosts.
//!
//! A host with no `scheduler` or `handler` is probed over the remote
//! executor. Each probe is a command that only succeeds in the matching
//! environment; probes run in a fixed order and a non-zero exit just moves
//! on to the next candidate. Results are saved through the [`HostStore`] so
//! detection is paid once per host.

use rustc_hash::FxHashSet;

use crate::config::HostStore;
use crate::error::{SchedError, SchedResult};
use crate::executor::{ExecError, RemoteExecutor};
use crate::host::{Host, Hosts, SchedulerKind};

/// A command whose success identifies `value`.
#[derive(Debug, Clone, Copy)]
pub struct Probe<T> {
    /// What a successful probe detects.
    pub value: T,
    /// Shell command run on the host.
    pub command: &'static str,
}

/// Scheduler probes in priority order.
pub const SCHEDULER_PROBES: &[Probe<SchedulerKind>] = &[
    Probe {
        value: SchedulerKind::Pbs,
        command: "env | grep -i 'pbs'",
    },
    Probe {
        value: SchedulerKind::Lsf,
        command: "env | grep -i 'lsf'",
    },
    Probe {
        value: SchedulerKind::Sge,
        command: "env | grep -i 'sge'",
    },
    Probe {
        value: SchedulerKind::Slurm,
        command: "which sbatch",
    },
];

/// Launcher probes in priority order. Cray's launcher wins over generic MPI.
pub const LAUNCHER_PROBES: &[Probe<&str>] = &[
    Probe {
        value: "aprun",
        command: "which aprun",
    },
    Probe {
        value: "mpirun",
        command: "which mpirun",
    },
    Probe {
        value: "srun",
        command: "which srun",
    },
];

/// How a probe table is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbePolicy {
    /// Stop at the first probe that succeeds.
    #[default]
    FirstSuccess,
    /// Run every probe and keep the first match, warning when several match.
    Exhaustive,
}

/// Outcome of detecting one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionReport {
    /// Resource name.
    pub host: String,
    /// Scheduler found by probing, if probing ran and matched.
    pub scheduler: Option<SchedulerKind>,
    /// Launcher found by probing, if probing ran and matched.
    pub handler: Option<String>,
    /// What could not be detected (`"scheduler"`, `"launcher"`).
    pub missing: Vec<&'static str>,
}

impl DetectionReport {
    /// Whether the host record was changed.
    pub fn changed(&self) -> bool {
        self.scheduler.is_some() || self.handler.is_some()
    }

    /// The failures as errors, for callers that want to surface them.
    pub fn failures(&self) -> Vec<SchedError> {
        self.missing
            .iter()
            .map(|&what| SchedError::DetectionFailure {
                host: self.host.clone(),
                what,
            })
            .collect()
    }
}

/// Probes hosts for their scheduler and launcher.
pub struct EnvironmentDetector<'a> {
    executor: &'a dyn RemoteExecutor,
    policy: ProbePolicy,
}

impl<'a> EnvironmentDetector<'a> {
    /// Create a detector with the first-success policy.
    pub fn new(executor: &'a dyn RemoteExecutor) -> Self {
        Self {
            executor,
            policy: ProbePolicy::default(),
        }
    }

    /// Set the probe policy.
    pub fn with_policy(mut self, policy: ProbePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Evaluate a probe table against `host`.
    ///
    /// Non-zero exits are expected and skipped. Transport failures abort.
    pub async fn run_probes<T: Copy + std::fmt::Debug>(
        &self,
        host: &Host,
        probes: &[Probe<T>],
    ) -> SchedResult<Option<T>> {
        let mut found = None;
        for probe in probes {
            match self.executor.run(host, &[probe.command.to_string()]).await {
                Ok(_) => {
                    tracing::debug!(host = %host.name, command = probe.command, "probe matched");
                    match found {
                        None => found = Some(probe.value),
                        Some(first) => tracing::warn!(
                            host = %host.name,
                            kept = ?first,
                            ignored = ?probe.value,
                            "more than one probe matched"
                        ),
                    }
                    if self.policy == ProbePolicy::FirstSuccess {
                        break;
                    }
                }
                Err(ExecError::NonZeroExit { .. }) => {
                    tracing::trace!(host = %host.name, command = probe.command, "probe did not match");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(found)
    }

    /// Fill in the missing scheduler and launcher of one host.
    pub async fn detect_host(&self, host: &mut Host) -> SchedResult<DetectionReport> {
        let mut report = DetectionReport {
            host: host.name.clone(),
            ..Default::default()
        };

        if host.scheduler.is_none() {
            tracing::info!(host = %host.name, "no scheduler configured, detecting");
            match self.run_probes(host, SCHEDULER_PROBES).await? {
                Some(kind) => {
                    tracing::info!(host = %host.name, scheduler = %kind, "scheduler detected");
                    host.scheduler = Some(kind);
                    report.scheduler = Some(kind);
                }
                None => report.missing.push("scheduler"),
            }
        }

        if host.handler.as_deref().is_none_or(str::is_empty) {
            tracing::info!(host = %host.name, "no launcher configured, detecting");
            match self.run_probes(host, LAUNCHER_PROBES).await? {
                Some(handler) => {
                    tracing::info!(host = %host.name, handler, "launcher detected");
                    host.handler = Some(handler.to_string());
                    report.handler = Some(handler.to_string());
                }
                None => report.missing.push("launcher"),
            }
        }

        for failure in report.failures() {
            tracing::warn!(host = %host.name, "{failure}");
        }
        Ok(report)
    }

    /// Detect every named resource at most once and save the store once if
    /// anything changed.
    pub async fn detect_all<'r>(
        &self,
        hosts: &mut Hosts,
        resources: impl IntoIterator<Item = &'r str>,
        store: &dyn HostStore,
    ) -> SchedResult<Vec<DetectionReport>> {
        let mut visited = FxHashSet::default();
        let mut reports = Vec::new();

        for resource in resources {
            if !visited.insert(resource) {
                continue;
            }
            let Some(host) = hosts.get_mut(resource) else {
                tracing::warn!(resource, "resource not in host configuration, skipping detection");
                continue;
            };
            if !host.needs_detection() {
                continue;
            }
            reports.push(self.detect_host(host).await?);
        }

        if reports.iter().any(DetectionReport::changed) {
            store.save(hosts).await?;
        }
        Ok(reports)
    }
}
