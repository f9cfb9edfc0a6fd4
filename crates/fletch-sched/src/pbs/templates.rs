//! PBS batch script template.

use crate::backend::{
    ResolvedResources, account_directive, execution_lines, finish_script, module_lines,
};
use crate::host::Host;
use crate::job::Job;

/// Generate a PBS batch script.
pub fn generate_pbs_script(
    host: &Host,
    job: &Job,
    res: &ResolvedResources,
    launch: &str,
) -> String {
    let mut lines = vec!["#!/bin/bash --login".to_string()];

    lines.push(format!("#PBS -N {}", job.name));
    if let Some(queue) = job.queue.as_deref().filter(|q| !q.is_empty()) {
        lines.push(format!("#PBS -q {queue}"));
    }
    if let Some(account) = account_directive("#PBS", "-A", host, job) {
        lines.push(account);
    }

    // Most machines charge for the whole node, so ncpus is always the full node.
    let mut select = format!(
        "select={}:ncpus={}:mpiprocs={}",
        res.nodes, res.corespernode, res.corespernode
    );
    if let Some(memory) = job.resources.memory {
        select.push_str(&format!(":mem={memory}gb"));
    }
    lines.push(format!("#PBS -l {select}"));
    lines.push(format!("#PBS -l walltime={}", job.resources.maxtime.hms()));

    lines.push(String::new());
    lines.push("export PBS_O_WORKDIR=$(readlink -f $PBS_O_WORKDIR)".to_string());
    lines.push("cd $PBS_O_WORKDIR".to_string());
    lines.push("export OMP_NUM_THREADS=1".to_string());
    lines.push(String::new());

    lines.extend(module_lines(job));
    lines.extend(execution_lines(launch, job, "$PBS_O_WORKDIR"));

    finish_script(lines)
}
