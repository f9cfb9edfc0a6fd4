//! SGE (Sun / Univa Grid Engine) backend.

mod adapter;
mod parser;
mod templates;

pub use adapter::SgeBackend;
pub use parser::{parse_sge_qsub_output, parse_sge_state};
