//! LSF batch script template.

use crate::backend::{
    ResolvedResources, account_directive, execution_lines, finish_script, module_lines,
};
use crate::host::Host;
use crate::job::Job;

/// Generate an LSF batch script.
pub fn generate_lsf_script(
    host: &Host,
    job: &Job,
    res: &ResolvedResources,
    launch: &str,
) -> String {
    let mut lines = vec!["#!/bin/bash --login".to_string()];

    lines.push(format!("#BSUB -J {}", job.name));
    if let Some(queue) = job.queue.as_deref().filter(|q| !q.is_empty()) {
        lines.push(format!("#BSUB -q {queue}"));
    }
    if let Some(account) = account_directive("#BSUB", "-P", host, job) {
        lines.push(account);
    }
    lines.push(format!("#BSUB -W {}", job.resources.maxtime.hm()));
    lines.push(format!("#BSUB -n {}", res.cores));
    lines.push(format!("#BSUB -R \"span[ptile={}]\"", res.corespernode));
    lines.push(String::new());

    lines.extend(module_lines(job));

    // Platform MPI under LSF needs to be told where the hosts come from.
    let launch = if launch == "mpirun" {
        format!("{launch} -lsf")
    } else {
        launch.to_string()
    };
    lines.extend(execution_lines(&launch, job, "$LS_SUBCWD"));

    finish_script(lines)
}
