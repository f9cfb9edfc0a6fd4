//! Host records: one entry per remote cluster login endpoint.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::SchedError;

/// The batch scheduler a host runs.
///
/// Read case-insensitively through [`FromStr`], written upper-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum SchedulerKind {
    /// PBS / Torque / PBS Pro.
    Pbs,
    /// IBM Spectrum LSF.
    Lsf,
    /// Sun / Univa Grid Engine.
    Sge,
    /// SLURM.
    Slurm,
    /// Cloud placeholder.
    Cloud,
}

impl SchedulerKind {
    /// Upper-case name as written to configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerKind::Pbs => "PBS",
            SchedulerKind::Lsf => "LSF",
            SchedulerKind::Sge => "SGE",
            SchedulerKind::Slurm => "SLURM",
            SchedulerKind::Cloud => "CLOUD",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulerKind {
    type Err = SchedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PBS" => Ok(SchedulerKind::Pbs),
            "LSF" => Ok(SchedulerKind::Lsf),
            "SGE" => Ok(SchedulerKind::Sge),
            "SLURM" => Ok(SchedulerKind::Slurm),
            "CLOUD" | "AMAZON" => Ok(SchedulerKind::Cloud),
            other => Err(SchedError::Configuration(format!(
                "unknown scheduler '{other}' (expected PBS, LSF, SGE, SLURM or CLOUD)"
            ))),
        }
    }
}

impl TryFrom<String> for SchedulerKind {
    type Error = SchedError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A blank value means "not configured yet", the same as an absent key.
fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

fn default_port() -> u16 {
    22
}

fn default_peflag() -> String {
    "mpi".to_string()
}

/// A remote cluster login endpoint.
///
/// `scheduler` and `handler` start out empty for unconfigured hosts and are
/// filled in by [`EnvironmentDetector`](crate::detect::EnvironmentDetector).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Host {
    /// Resource name (the key in the hosts file).
    #[serde(skip)]
    pub name: String,

    /// Network address of the login node.
    pub host: String,

    /// Remote user name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Batch scheduler, empty until detected.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub scheduler: Option<SchedulerKind>,

    /// Parallel launcher binary, empty until detected.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub handler: Option<String>,

    /// Default account to charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Custom directive flag for the account, replacing the scheduler default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accountflag: Option<String>,

    /// Default total core count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cores: Option<u32>,

    /// Cores available on one node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corespernode: Option<u32>,

    /// Base remote working directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remoteworkdir: Option<String>,

    /// SGE parallel environment name.
    #[serde(default = "default_peflag")]
    pub sge_peflag: String,

    /// Request whole nodes from the SGE parallel environment.
    #[serde(default)]
    pub sge_peoverride: bool,
}

impl Host {
    /// Create a host with only an address set.
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: address.into(),
            user: None,
            port: default_port(),
            scheduler: None,
            handler: None,
            account: None,
            accountflag: None,
            cores: None,
            corespernode: None,
            remoteworkdir: None,
            sge_peflag: default_peflag(),
            sge_peoverride: false,
        }
    }

    /// Set the remote user.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the scheduler kind.
    pub fn with_scheduler(mut self, kind: SchedulerKind) -> Self {
        self.scheduler = Some(kind);
        self
    }

    /// Set the launcher binary.
    pub fn with_handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Set the default account.
    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// Set the cores per node.
    pub fn with_corespernode(mut self, cpn: u32) -> Self {
        self.corespernode = Some(cpn);
        self
    }

    /// `user@host` as understood by ssh and rsync.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// Whether the environment detector still has work to do.
    pub fn needs_detection(&self) -> bool {
        self.scheduler.is_none() || self.handler.as_deref().is_none_or(str::is_empty)
    }
}

/// All configured hosts, keyed by resource name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Hosts(BTreeMap<String, Host>);

impl Hosts {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a host under its own name.
    pub fn insert(&mut self, host: Host) {
        self.0.insert(host.name.clone(), host);
    }

    /// Look up a host by resource name.
    pub fn get(&self, name: &str) -> Option<&Host> {
        self.0.get(name)
    }

    /// Mutable lookup by resource name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Host> {
        self.0.get_mut(name)
    }

    /// Number of hosts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over hosts in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Host> {
        self.0.values()
    }

    /// Copy each map key into the host's `name` field after deserializing.
    pub(crate) fn fill_names(&mut self) {
        for (name, host) in &mut self.0 {
            host.name.clone_from(name);
        }
    }
}

impl FromIterator<Host> for Hosts {
    fn from_iter<I: IntoIterator<Item = Host>>(iter: I) -> Self {
        let mut hosts = Hosts::new();
        for host in iter {
            hosts.insert(host);
        }
        hosts
    }
}
