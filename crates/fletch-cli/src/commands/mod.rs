//! CLI command implementations.

pub mod common;
pub mod delete;
pub mod detect;
pub mod prepare;
pub mod run;
pub mod status;
