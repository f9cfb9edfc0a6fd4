//! SLURM integration for HPC job submission.

mod adapter;
mod parser;
mod templates;

pub use adapter::SlurmBackend;
pub use parser::{parse_sbatch_output, parse_slurm_state};
