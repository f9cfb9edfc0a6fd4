//! Parsers for PBS command output.

use crate::backend::{leading_digits, status_from_column};
use crate::job::JobStatus;

/// Column of the state code in the default `qstat` listing.
///
/// ```text
/// Job id            Name             User              Time Use S Queue
/// ----------------  ---------------- ----------------  -------- - -----
/// 12345.pbs-server  my_job           user              00:05:23 R batch
/// ```
const STATE_COLUMN: usize = 4;

/// Parse qsub output to extract the numeric job ID.
///
/// qsub prints `<number>.<server>`; the server suffix is dropped.
pub fn parse_qsub_output(output: &str) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    leading_digits(line).map(str::to_string)
}

/// Parse the `qstat` listing for `job_id`.
pub fn parse_qstat_output(output: &str, job_id: &str) -> JobStatus {
    status_from_column(output, job_id, STATE_COLUMN, parse_pbs_state)
}

/// Parse a PBS single-letter state code.
pub fn parse_pbs_state(state: &str) -> JobStatus {
    match state {
        "H" => JobStatus::Held,
        "Q" => JobStatus::Queued,
        "R" => JobStatus::Running,
        "B" => JobStatus::SubjobsRunning,
        "E" => JobStatus::Exiting,
        "M" => JobStatus::Moved,
        "S" => JobStatus::Suspended,
        "T" => JobStatus::Transit,
        "U" => JobStatus::CycleHarvestSuspended,
        "W" => JobStatus::WaitingForStart,
        "X" => JobStatus::SubjobCompleted,
        // Torque keeps completed jobs listed as C; PBS Pro history shows F.
        "C" | "F" => JobStatus::Finished,
        other => JobStatus::Unknown(other.to_string()),
    }
}
