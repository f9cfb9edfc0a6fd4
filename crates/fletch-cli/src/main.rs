//! Fletch Command-Line Interface
//!
//! Runs batch jobs on remote HPC clusters described by a hosts file and a
//! jobs file.
//!
//! ```text
//! fletch run --jobs jobs.yaml            # detect, prepare, stage, submit, poll
//! fletch detect --jobs jobs.yaml         # fill in scheduler and launcher only
//! fletch prepare --jobs jobs.yaml        # write submission scripts locally
//! fletch status --resource archer 4242   # one-off status query
//! fletch delete --resource archer 4242   # cancel jobs
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use fletch_sched::{ProbePolicy, SshConfig};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::Connection;
use commands::{delete, detect, prepare, run, status};

/// Fletch - batch jobs on remote HPC clusters over ssh
#[derive(Parser)]
#[command(name = "fletch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Hosts file (defaults to ~/.fletch/hosts.yaml)
    #[arg(long, env = "FLETCH_HOSTS", global = true)]
    hosts: Option<PathBuf>,

    /// Timeout for each ssh call, in seconds
    #[arg(long, default_value_t = 120, global = true)]
    ssh_timeout: u64,

    /// Extra ssh attempts after a connection failure
    #[arg(long, default_value_t = 3, global = true)]
    retries: u32,

    /// Timeout for each rsync transfer, in seconds
    #[arg(long, default_value_t = 3600, global = true)]
    transfer_timeout: u64,

    /// Run every detection probe and warn when more than one matches
    #[arg(long, global = true)]
    exhaustive_detect: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job in a jobs file to completion
    Run {
        /// Jobs file (YAML)
        #[arg(short, long)]
        jobs: PathBuf,

        /// Give up polling after this many seconds
        #[arg(long)]
        max_wait: Option<u64>,

        /// Detect and write scripts only, without touching the clusters' queues
        #[arg(long)]
        dry_run: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Probe hosts used by a jobs file for their scheduler and launcher
    Detect {
        /// Jobs file (YAML)
        #[arg(short, long)]
        jobs: PathBuf,
    },

    /// Write submission scripts without submitting
    Prepare {
        /// Jobs file (YAML)
        #[arg(short, long)]
        jobs: PathBuf,
    },

    /// Query the scheduler for one job
    Status {
        /// Host name from the hosts file
        #[arg(short, long)]
        resource: String,

        /// Scheduler job ID
        job_id: String,
    },

    /// Cancel jobs
    Delete {
        /// Host name from the hosts file
        #[arg(short, long)]
        resource: String,

        /// Scheduler job IDs
        #[arg(required = true)]
        job_ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let connection = Connection {
        hosts: cli.hosts,
        ssh: SshConfig {
            timeout: Duration::from_secs(cli.ssh_timeout),
            retries: cli.retries,
            ..SshConfig::default()
        },
        transfer_timeout: Duration::from_secs(cli.transfer_timeout),
        probe_policy: if cli.exhaustive_detect {
            ProbePolicy::Exhaustive
        } else {
            ProbePolicy::FirstSuccess
        },
    };

    // Execute command
    let result = match cli.command {
        Commands::Run {
            jobs,
            max_wait,
            dry_run,
            json,
        } => run::execute(&connection, &jobs, max_wait, dry_run, json).await,

        Commands::Detect { jobs } => detect::execute(&connection, &jobs).await,

        Commands::Prepare { jobs } => prepare::execute(&connection, &jobs).await,

        Commands::Status { resource, job_id } => {
            status::execute(&connection, &resource, &job_id).await
        }

        Commands::Delete { resource, job_ids } => {
            delete::execute(&connection, &resource, &job_ids).await
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
