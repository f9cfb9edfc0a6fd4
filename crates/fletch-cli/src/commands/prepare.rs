//! Prepare command implementation.

use std::path::Path;

use anyhow::Result;
use console::style;

use fletch_sched::JobPhase;

use super::common::{Connection, open, print_failures};

/// Execute the prepare command.
///
/// Hosts missing a scheduler or launcher are probed first, so this still
/// reaches the clusters over ssh.
pub async fn execute(connection: &Connection, jobs: &Path) -> Result<()> {
    let mut orchestrator = open(connection, Some(jobs), false).await?;
    orchestrator.detect().await?;

    let failures = orchestrator.prepare_all().await;

    for tracked in orchestrator.jobs() {
        if tracked.phase != JobPhase::Prepared {
            continue;
        }
        let script = tracked.job.subfile.as_deref().unwrap_or_default();
        println!(
            "{} {} → {}",
            style("✓").green().bold(),
            style(&tracked.job.name).bold(),
            tracked.job.localworkdir.join(script).display()
        );
    }
    print_failures("prepare", &failures);

    if !failures.is_empty() {
        anyhow::bail!("{} job(s) could not be prepared", failures.len());
    }
    Ok(())
}
