//! Delete command implementation.

use anyhow::Result;
use console::style;

use super::common::{Connection, open};

/// Execute the delete command.
pub async fn execute(connection: &Connection, resource: &str, job_ids: &[String]) -> Result<()> {
    let orchestrator = open(connection, None, false).await?;

    let mut failed = 0;
    for job_id in job_ids {
        match orchestrator.delete_job(resource, job_id).await {
            Ok(_) => println!(
                "{} Cancelled job {} on {}",
                style("✓").green().bold(),
                style(job_id).bold(),
                resource
            ),
            Err(e) => {
                failed += 1;
                eprintln!("  {} {e}", style("✗").red().bold());
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) could not be cancelled", job_ids.len());
    }
    Ok(())
}
