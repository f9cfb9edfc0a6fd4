//! Run command implementation.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use console::style;

use fletch_sched::MonitorConfig;

use super::common::{Connection, open, print_failures, print_report, spinner};

/// Execute the run command.
pub async fn execute(
    connection: &Connection,
    jobs: &Path,
    max_wait: Option<u64>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let mut orchestrator = open(connection, Some(jobs), !dry_run)
        .await?
        .with_monitor_config(MonitorConfig {
            max_wait: max_wait.map(Duration::from_secs),
        });

    if !json {
        println!(
            "{} Loaded {} job(s) from {}",
            style("→").cyan().bold(),
            orchestrator.jobs().len(),
            jobs.display()
        );
    }

    let reports = orchestrator.detect().await?;
    for report in &reports {
        print_failures("detect", &report.failures());
    }

    print_failures("prepare", &orchestrator.prepare_all().await);

    if dry_run {
        let report = orchestrator.report(0);
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report);
        }
        return Ok(());
    }

    print_failures("stage", &orchestrator.stage_all().await);
    print_failures("submit", &orchestrator.submit_all().await);

    let pending = orchestrator
        .jobs()
        .iter()
        .filter(|t| t.is_pending())
        .count();
    let progress = if json {
        None
    } else {
        Some(spinner(format!("Waiting for {pending} job(s)..."))?)
    };

    let outcome = {
        let monitor = orchestrator.monitor();
        tokio::pin!(monitor);
        tokio::select! {
            result = &mut monitor => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    if let Some(progress) = progress {
        progress.finish_and_clear();
    }

    let interrupted = outcome.is_none();
    let report = match outcome {
        Some(result) => result?,
        None => {
            eprintln!(
                "{} Interrupted, cancelling queued jobs",
                style("!").yellow().bold()
            );
            print_failures("delete", &orchestrator.delete_all().await);
            orchestrator.report(0)
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    let failed = report.failed().count();
    if failed > 0 {
        anyhow::bail!("{failed} job(s) failed");
    }
    if interrupted {
        let left = orchestrator
            .jobs()
            .iter()
            .filter(|t| t.is_pending())
            .count();
        if left > 0 {
            anyhow::bail!("run interrupted, {left} job(s) could not be cancelled");
        }
        anyhow::bail!("run interrupted");
    }
    Ok(())
}
