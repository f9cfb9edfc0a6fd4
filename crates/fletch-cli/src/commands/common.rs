//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use fletch_sched::{
    HostStore, JobPhase, JobStatus, JobsFile, MonitorReport, NoopStager, Orchestrator,
    ProbePolicy, RemoteExecutor, RsyncStager, RunContext, SchedError, SshConfig, SshExecutor,
    Stager, YamlHostStore,
};

/// Settings for reaching the clusters, shared by every command.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Hosts file; `None` uses [`default_hosts_path`].
    pub hosts: Option<PathBuf>,
    /// ssh timeout and retry behaviour.
    pub ssh: SshConfig,
    /// Limit on a single rsync transfer.
    pub transfer_timeout: Duration,
    /// How unconfigured hosts are probed.
    pub probe_policy: ProbePolicy,
}

/// Return the default hosts file (~/.fletch/hosts.yaml).
pub fn default_hosts_path() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(home.join(".fletch").join("hosts.yaml"))
}

/// Build an orchestrator over the hosts file and, optionally, a jobs file.
///
/// With `stage` unset no files are copied to or from the clusters.
pub async fn open(
    connection: &Connection,
    jobs: Option<&Path>,
    stage: bool,
) -> Result<Orchestrator> {
    let hosts_path = match &connection.hosts {
        Some(path) => path.clone(),
        None => default_hosts_path()?,
    };

    let store = Arc::new(YamlHostStore::new(&hosts_path));
    let hosts = store
        .load()
        .await
        .with_context(|| format!("Failed to load hosts from {}", hosts_path.display()))?;

    let jobs = match jobs {
        Some(path) => {
            JobsFile::load(path)
                .await
                .with_context(|| format!("Failed to load jobs from {}", path.display()))?
                .jobs
        }
        None => Vec::new(),
    };

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(connection.ssh.clone()));
    let stager: Arc<dyn Stager> = if stage {
        Arc::new(RsyncStager::new(executor.clone()).with_timeout(connection.transfer_timeout))
    } else {
        Arc::new(NoopStager)
    };

    Ok(Orchestrator::new(
        RunContext::new(executor, stager, store),
        hosts,
        jobs,
    )
    .with_probe_policy(connection.probe_policy))
}

/// A cyan spinner in the style used across commands.
pub fn spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(message.into());
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    Ok(spinner)
}

/// Print per-job failures from one lifecycle step.
pub fn print_failures(step: &str, failures: &[SchedError]) {
    for failure in failures {
        eprintln!("  {} {step}: {failure}", style("✗").red().bold());
    }
}

/// Colour a scheduler state for the terminal.
pub fn styled_status(status: &JobStatus) -> String {
    match status {
        JobStatus::Running => style(status).green().to_string(),
        JobStatus::Queued => style(status).cyan().to_string(),
        JobStatus::Held => style(status).yellow().to_string(),
        JobStatus::Finished => style(status).dim().to_string(),
        other => style(other).to_string(),
    }
}

/// Print a run report as a table.
pub fn print_report(report: &MonitorReport) {
    println!(
        "\n{} {} job(s) after {} poll pass(es):",
        style("✓").green().bold(),
        report.jobs.len(),
        report.passes
    );
    println!(
        "  {:<20} {:<14} {:<12} {:<10}",
        style("NAME").bold(),
        style("RESOURCE").bold(),
        style("JOB ID").bold(),
        style("STATE").bold()
    );

    for outcome in &report.jobs {
        let state = match (&outcome.error, &outcome.status, outcome.phase) {
            (Some(_), _, _) => style("error").red().bold().to_string(),
            (None, Some(status), _) => styled_status(status),
            (None, None, JobPhase::Prepared | JobPhase::Staged) => {
                style("prepared").cyan().to_string()
            }
            (None, None, _) => style("-").dim().to_string(),
        };
        println!(
            "  {:<20} {:<14} {:<12} {}",
            outcome.name,
            outcome.resource,
            outcome.jobid.as_deref().unwrap_or("-"),
            state
        );
        if let Some(error) = &outcome.error {
            println!("    {}", style(error).red());
        }
    }
}
