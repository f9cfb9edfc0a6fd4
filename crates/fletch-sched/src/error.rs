//! Error handling for the job lifecycle.

use thiserror::Error;

use crate::executor::ExecError;

/// Result type for scheduler operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur while preparing, submitting, polling or deleting jobs.
#[derive(Error, Debug)]
pub enum SchedError {
    /// The resource request or another configuration value cannot be resolved.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No probe matched while detecting the host environment.
    #[error("Could not detect the {what} on host {host}")]
    DetectionFailure { host: String, what: &'static str },

    /// The host has no scheduler configured or detected.
    #[error("No scheduler is known for host {host}; set one in the host configuration")]
    SchedulerUnset { host: String },

    /// A job refers to a resource that is not in the host configuration.
    #[error("Job {job} refers to unknown resource {resource}")]
    UnknownResource { job: String, resource: String },

    /// Submission failed or the job identifier could not be parsed.
    #[error("Submission of job {job} to {host} failed: {command} - {message}")]
    Submission {
        job: String,
        host: String,
        command: String,
        message: String,
    },

    /// A status query failed for a reason other than the job leaving the queue.
    #[error("Status query for job {job_id} on {host} failed: {message}")]
    StatusQuery {
        job_id: String,
        host: String,
        message: String,
    },

    /// Cancelling a job failed.
    #[error("Deleting job {job_id} on {host} failed: {message}")]
    JobDelete {
        job_id: String,
        host: String,
        message: String,
    },

    /// Uploading or downloading job files failed.
    #[error("Staging for job {job} on {host} failed: {message}")]
    Staging {
        job: String,
        host: String,
        message: String,
    },

    /// Remote execution error that is not attributed to a specific job.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Timeout waiting for jobs to finish.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML configuration parse or write error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}
