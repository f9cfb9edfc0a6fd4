//! Parsers for SGE command output.

use crate::backend::status_from_column;
use crate::job::JobStatus;

/// Column of the `state` field in `qstat -u` output.
///
/// ```text
/// job-ID  prior   name  user  state submit/start at     queue        slots
/// 1234567 0.50500 md    jdoe  r     10/18/2026 10:01:22 all.q@node01 16
/// ```
const STATE_COLUMN: usize = 4;

/// Parse SGE qsub output to extract the job ID.
///
/// qsub prints `Your job 1234567 ("md") has been submitted`; the first
/// all-digit word is the id.
pub fn parse_sge_qsub_output(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|word| word.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

/// Parse the `qstat -u` listing for `job_id`.
pub fn parse_sge_qstat_output(output: &str, job_id: &str) -> JobStatus {
    status_from_column(output, job_id, STATE_COLUMN, parse_sge_state)
}

/// Parse an SGE state code.
pub fn parse_sge_state(state: &str) -> JobStatus {
    match state {
        "h" | "hqw" | "hr" => JobStatus::Held,
        "qw" => JobStatus::Queued,
        "r" | "t" => JobStatus::Running,
        other => JobStatus::Unknown(other.to_string()),
    }
}
