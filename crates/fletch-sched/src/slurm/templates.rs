//! SLURM batch script template.

use crate::backend::{
    ResolvedResources, account_directive, execution_lines, finish_script, module_lines,
};
use crate::host::Host;
use crate::job::Job;

/// Generate a SLURM batch script.
pub fn generate_slurm_script(
    host: &Host,
    job: &Job,
    res: &ResolvedResources,
    launch: &str,
) -> String {
    let mut lines = vec!["#!/bin/bash --login".to_string()];

    lines.push(format!("#SBATCH -J {}", job.name));
    if let Some(queue) = job.queue.as_deref().filter(|q| !q.is_empty()) {
        lines.push(format!("#SBATCH -p {queue}"));
    }
    if let Some(account) = account_directive("#SBATCH", "-A", host, job) {
        lines.push(account);
    }
    lines.push(format!("#SBATCH -n {}", res.cores));
    lines.push(format!("#SBATCH -N {}", res.nodes));
    if let Some(memory) = job.resources.memory {
        lines.push(format!("#SBATCH --mem={memory}G"));
    }
    lines.push(format!("#SBATCH -t {}", job.resources.maxtime.hms()));
    lines.push(String::new());

    lines.extend(module_lines(job));
    lines.extend(execution_lines(launch, job, "$SLURM_SUBMIT_DIR"));

    finish_script(lines)
}
