//! Status command implementation.

use anyhow::Result;
use console::style;

use super::common::{Connection, open, styled_status};

/// Execute the status command.
pub async fn execute(connection: &Connection, resource: &str, job_id: &str) -> Result<()> {
    let orchestrator = open(connection, None, false).await?;
    let status = orchestrator.query_status(resource, job_id).await?;

    println!(
        "{} Job {} on {}: {}",
        style("→").cyan().bold(),
        style(job_id).bold(),
        resource,
        styled_status(&status)
    );
    Ok(())
}
