//! PBS (Portable Batch System) backend.
//!
//! Covers PBS Pro, OpenPBS and Torque. Jobs are submitted with `qsub`,
//! polled through the default `qstat` listing and cancelled with `qdel`.

mod adapter;
mod parser;
mod templates;

pub use adapter::PbsBackend;
pub use parser::{parse_pbs_state, parse_qsub_output};
