//! SGE batch script template.

use crate::backend::{
    ResolvedResources, account_directive, execution_lines, finish_script, module_lines,
};
use crate::host::Host;
use crate::job::Job;

/// Generate an SGE batch script.
pub fn generate_sge_script(
    host: &Host,
    job: &Job,
    res: &ResolvedResources,
    launch: &str,
) -> String {
    let mut lines = vec!["#!/bin/bash --login".to_string()];

    lines.push("#$ -cwd -V".to_string());
    lines.push(format!("#$ -N {}", job.name));
    if let Some(queue) = job.queue.as_deref().filter(|q| !q.is_empty()) {
        lines.push(format!("#$ -q {queue}"));
    }
    if let Some(account) = account_directive("#$", "-A", host, job) {
        lines.push(account);
    }
    lines.push(format!("#$ -l h_rt={}", job.resources.maxtime.hms()));

    // Some parallel environments only hand out whole nodes.
    let slots = if host.sge_peoverride {
        res.nodes.saturating_mul(res.corespernode)
    } else {
        res.cores
    };
    lines.push(format!("#$ -pe {} {slots}", host.sge_peflag));
    lines.push(String::new());

    lines.extend(module_lines(job));
    lines.extend(execution_lines(launch, job, "$(pwd)"));

    finish_script(lines)
}
