//! Parsers for SLURM command output.

use crate::backend::status_from_column;
use crate::job::JobStatus;

/// Column of the `ST` field in the default `squeue` listing.
///
/// ```text
///   JOBID PARTITION     NAME     USER ST       TIME  NODES NODELIST(REASON)
///  123456  standard       md     jdoe  R      12:04      2 nid[001-002]
/// ```
const STATE_COLUMN: usize = 4;

/// Parse sbatch output to extract the job ID.
///
/// sbatch prints `Submitted batch job <id>`; the id is the trailing number of
/// the last non-empty line.
pub fn parse_sbatch_output(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).rfind(|l| !l.is_empty())?;
    let start = line
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    let digits = &line[start..];
    (!digits.is_empty()).then(|| digits.to_string())
}

/// Parse the `squeue` listing for `job_id`.
pub fn parse_squeue_output(output: &str, job_id: &str) -> JobStatus {
    status_from_column(output, job_id, STATE_COLUMN, parse_slurm_state)
}

/// Parse a SLURM compact state code.
pub fn parse_slurm_state(state: &str) -> JobStatus {
    match state {
        "PD" => JobStatus::Queued,
        "R" => JobStatus::Running,
        "S" => JobStatus::Held,
        "CD" => JobStatus::Finished,
        "CA" => JobStatus::Cancelled,
        "CF" => JobStatus::Configuring,
        "CG" => JobStatus::Completing,
        "F" => JobStatus::Failed,
        "NF" => JobStatus::NodeFailure,
        "PR" => JobStatus::Preempted,
        "TO" => JobStatus::TimedOut,
        other => JobStatus::Unknown(other.to_string()),
    }
}
