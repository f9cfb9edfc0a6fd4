//! Parsers for LSF command output.

use crate::backend::status_from_column;
use crate::job::JobStatus;

/// Column of the `STAT` field in the default `bjobs` listing.
///
/// ```text
/// JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME
/// 4821    jdoe    RUN   normal     login1      16*node042  md         Oct 18 10:01
/// ```
const STATE_COLUMN: usize = 2;

/// Parse bsub output to extract the job ID.
///
/// bsub prints `Job <4821> is submitted to queue <normal>.`; the first
/// bracketed token is the id.
pub fn parse_bsub_output(output: &str) -> Option<String> {
    let start = output.find('<')? + 1;
    let len = output[start..].find('>')?;
    let id = &output[start..start + len];
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then(|| id.to_string())
}

/// Parse the `bjobs` listing for `job_id`.
pub fn parse_bjobs_output(output: &str, job_id: &str) -> JobStatus {
    status_from_column(output, job_id, STATE_COLUMN, parse_lsf_state)
}

/// Parse an LSF job state.
pub fn parse_lsf_state(state: &str) -> JobStatus {
    match state {
        "PSUSP" | "USUSP" | "SSUSP" => JobStatus::Held,
        "PEND" => JobStatus::Queued,
        "RUN" => JobStatus::Running,
        "DONE" | "EXIT" => JobStatus::Finished,
        other => JobStatus::Unknown(other.to_string()),
    }
}
