//! LSF (IBM Spectrum Load Sharing Facility) backend.
//!
//! Scripts are fed to `bsub` on stdin, polled with `bjobs` and cancelled
//! with `bkill`.

mod adapter;
mod parser;
mod templates;

pub use adapter::LsfBackend;
pub use parser::{parse_bsub_output, parse_lsf_state};
