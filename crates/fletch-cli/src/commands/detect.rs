//! Detect command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use super::common::{Connection, open, print_failures, spinner};

/// Execute the detect command.
pub async fn execute(connection: &Connection, jobs: &Path) -> Result<()> {
    let mut orchestrator = open(connection, Some(jobs), false).await?;

    let progress = spinner("Probing hosts...")?;
    let reports = orchestrator.detect().await;
    progress.finish_and_clear();
    let reports = reports?;

    if reports.is_empty() {
        println!(
            "{} Every host is already configured",
            style("✓").green().bold()
        );
        return Ok(());
    }

    let mut missing = 0;
    for report in &reports {
        let Some(host) = orchestrator.hosts().get(&report.host) else {
            continue;
        };
        println!(
            "{} {}: scheduler {}, launcher {}",
            style("→").cyan().bold(),
            style(&host.name).bold(),
            host.scheduler
                .map_or_else(|| style("unknown").red().to_string(), |s| s.to_string()),
            host.handler
                .as_deref()
                .map_or_else(|| style("unknown").red().to_string(), str::to_string),
        );
        let failures = report.failures();
        missing += failures.len();
        print_failures("detect", &failures);
    }

    if missing > 0 {
        anyhow::bail!("detection incomplete on {missing} setting(s)");
    }
    Ok(())
}
