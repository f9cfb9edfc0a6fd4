//! Fletch batch scheduler abstraction
//!
//! This crate submits, monitors and retires compute jobs on remote HPC
//! clusters. Every cluster is reached through a remote shell only; the batch
//! system it runs is hidden behind one [`SchedulerBackend`] trait.
//!
//! # Overview
//!
//! - [`Host`] and [`Job`] records, loaded from YAML by [`config`]
//! - [`EnvironmentDetector`] fills in an unconfigured host's scheduler and
//!   launcher by probing it
//! - one backend per scheduler writes the submission script and parses
//!   `submit`, `status` and `delete` output
//! - [`Orchestrator`] runs detect → prepare → stage → submit → poll over many
//!   jobs on many hosts
//!
//! # Supported Schedulers
//!
//! | Scheduler | Submit | Status | Cancel |
//! |-----------|--------|--------|--------|
//! | PBS / Torque | `qsub` | `qstat` | `qdel` |
//! | LSF | `bsub <` | `bjobs` | `bkill` |
//! | SGE | `qsub` | `qstat -u` | `qdel` |
//! | SLURM | `sbatch` | `squeue` | `scancel` |
//! | Cloud | placeholder, always a configuration error | | |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fletch_sched::{
//!     HostStore, JobsFile, Orchestrator, RsyncStager, RunContext, SshExecutor, YamlHostStore,
//! };
//!
//! let executor = Arc::new(SshExecutor::default());
//! let store = Arc::new(YamlHostStore::new("hosts.yaml"));
//! let stager = Arc::new(RsyncStager::new(executor.clone()));
//! let hosts = store.load().await?;
//! let jobs = JobsFile::load("jobs.yaml").await?.jobs;
//!
//! let mut orchestrator = Orchestrator::new(RunContext::new(executor, stager, store), hosts, jobs);
//! let report = orchestrator.run().await?;
//! ```

pub mod backend;
pub mod cloud;
pub mod config;
pub mod detect;
pub mod error;
pub mod executor;
pub mod host;
pub mod job;
pub mod lsf;
pub mod orchestrator;
pub mod pbs;
pub mod sge;
pub mod slurm;
pub mod staging;

pub use backend::{SchedulerBackend, backend_for, node_count, resolve_resources};
pub use config::{HostStore, JobsFile, YamlHostStore};
pub use detect::{DetectionReport, EnvironmentDetector, ProbePolicy};
pub use error::{SchedError, SchedResult};
pub use executor::{ExecError, ExecResult, RemoteExecutor, SshConfig, SshExecutor};
pub use host::{Host, Hosts, SchedulerKind};
pub use job::{Job, JobPhase, JobStatus, ResourceRequest, Walltime};
pub use orchestrator::{JobOutcome, MonitorConfig, MonitorReport, Orchestrator, RunContext, TrackedJob};
pub use staging::{NoopStager, RsyncStager, Stager};
