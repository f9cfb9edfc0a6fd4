//! Host and job configuration files.
//!
//! Hosts live in a YAML mapping keyed by resource name:
//!
//! ```yaml
//! archer:
//!   host: login.archer.ac.uk
//!   user: jdoe
//!   corespernode: 24
//!   remoteworkdir: /work/e280/jdoe
//! ```
//!
//! Detected `scheduler` and `handler` values are written back into the same
//! file so detection is not repeated on the next run.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::error::{SchedError, SchedResult};
use crate::host::Hosts;
use crate::job::Job;

/// Trait for host configuration storage.
#[async_trait]
pub trait HostStore: Send + Sync {
    /// Load every configured host.
    async fn load(&self) -> SchedResult<Hosts>;

    /// Persist the full host registry.
    async fn save(&self, hosts: &Hosts) -> SchedResult<()>;
}

/// YAML file-based host store.
#[derive(Debug, Clone)]
pub struct YamlHostStore {
    path: PathBuf,
}

impl YamlHostStore {
    /// Create a store backed by the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HostStore for YamlHostStore {
    async fn load(&self) -> SchedResult<Hosts> {
        let content = fs::read_to_string(&self.path).await.map_err(|e| {
            SchedError::Configuration(format!(
                "cannot read hosts file {}: {e}",
                self.path.display()
            ))
        })?;
        let mut hosts: Hosts = if content.trim().is_empty() {
            Hosts::new()
        } else {
            serde_yaml_ng::from_str(&content)?
        };
        hosts.fill_names();
        tracing::debug!(path = %self.path.display(), hosts = hosts.len(), "loaded hosts");
        Ok(hosts)
    }

    async fn save(&self, hosts: &Hosts) -> SchedResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let yaml = serde_yaml_ng::to_string(hosts)?;

        // Write to a sibling file first so a crash never leaves a truncated config.
        let tmp = self.path.with_extension("yaml.tmp");
        fs::write(&tmp, yaml).await?;
        fs::rename(&tmp, &self.path).await?;

        tracing::info!(path = %self.path.display(), "saved host configuration");
        Ok(())
    }
}

/// Contents of a jobs file: a `jobs:` list of job records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsFile {
    /// Jobs in submission order.
    #[serde(default)]
    pub jobs: Vec<Job>,
}

impl JobsFile {
    /// Parse a jobs file from YAML text.
    pub fn from_yaml(content: &str) -> SchedResult<Self> {
        let file: JobsFile = serde_yaml_ng::from_str(content)?;
        file.validate()?;
        Ok(file)
    }

    /// Load and validate a jobs file.
    ///
    /// Relative `localworkdir` values are resolved against the file's
    /// directory.
    pub async fn load(path: impl AsRef<Path>) -> SchedResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            SchedError::Configuration(format!("cannot read jobs file {}: {e}", path.display()))
        })?;
        let mut file = Self::from_yaml(&content)?;

        if let Some(base) = path.parent() {
            for job in &mut file.jobs {
                if job.localworkdir.is_relative() {
                    job.localworkdir = base.join(&job.localworkdir);
                }
            }
        }
        Ok(file)
    }

    /// Check every job and reject duplicate names.
    ///
    /// Job names double as remote directory names, so they must be unique.
    pub fn validate(&self) -> SchedResult<()> {
        let mut seen = FxHashSet::default();
        for job in &self.jobs {
            job.validate()?;
            if !seen.insert(job.name.as_str()) {
                return Err(SchedError::Configuration(format!(
                    "job name {} appears more than once",
                    job.name
                )));
            }
        }
        Ok(())
    }
}
