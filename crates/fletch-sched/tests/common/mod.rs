//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use fletch_sched::{
    ExecError, ExecResult, Host, HostStore, Hosts, RemoteExecutor, SchedResult, SchedulerKind,
    Stager,
};

/// Canned answer to a remote command.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Exit 0 with this stdout.
    Ok(String),
    /// Exit 1, as `grep` does when nothing matches.
    Fail,
    /// ssh could not reach the host.
    Down,
}

impl Reply {
    pub fn ok(stdout: &str) -> Self {
        Reply::Ok(stdout.to_string())
    }
}

struct Rule {
    host: Option<String>,
    prefix: String,
    replies: VecDeque<Reply>,
}

/// Executor answering the last command of each call from scripted rules.
///
/// A rule matches when the command starts with its prefix. Replies are used
/// in order; the final reply repeats. Unmatched commands fail with exit 1.
#[derive(Default)]
pub struct MockExecutor {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` on any host.
    pub fn on(self, prefix: &str, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.push_rule(None, prefix, replies);
        self
    }

    /// Answer commands starting with `prefix` on one host.
    pub fn on_host(
        self,
        host: &str,
        prefix: &str,
        replies: impl IntoIterator<Item = Reply>,
    ) -> Self {
        self.push_rule(Some(host.to_string()), prefix, replies);
        self
    }

    fn push_rule(&self, host: Option<String>, prefix: &str, replies: impl IntoIterator<Item = Reply>) {
        self.rules.lock().unwrap().push(Rule {
            host,
            prefix: prefix.to_string(),
            replies: replies.into_iter().collect(),
        });
    }

    /// Every call as (host name, commands).
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose last command starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, cmds)| cmds.last().is_some_and(|c| c.starts_with(prefix)))
            .count()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn run(&self, host: &Host, commands: &[String]) -> ExecResult<Vec<String>> {
        self.calls
            .lock()
            .unwrap()
            .push((host.name.clone(), commands.to_vec()));

        let last = commands.last().cloned().unwrap_or_default();
        let reply = {
            let mut rules = self.rules.lock().unwrap();
            rules
                .iter_mut()
                .find(|r| {
                    last.starts_with(&r.prefix)
                        && r.host.as_deref().is_none_or(|h| h == host.name)
                })
                .and_then(|r| {
                    if r.replies.len() > 1 {
                        r.replies.pop_front()
                    } else {
                        r.replies.front().cloned()
                    }
                })
                .unwrap_or(Reply::Fail)
        };

        match reply {
            Reply::Ok(stdout) => {
                let mut out = vec![String::new(); commands.len().saturating_sub(1)];
                out.push(stdout);
                Ok(out)
            }
            Reply::Fail => Err(ExecError::NonZeroExit {
                host: host.name.clone(),
                command: last,
                code: 1,
                stderr: String::new(),
            }),
            Reply::Down => Err(ExecError::Transport {
                host: host.name.clone(),
                message: "Connection timed out".to_string(),
            }),
        }
    }
}

/// Stager recording which hook ran for which remote directory.
#[derive(Default)]
pub struct RecordingStager {
    events: Mutex<Vec<String>>,
}

impl RecordingStager {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Stager for RecordingStager {
    async fn upload(
        &self,
        _host: &Host,
        _local_dir: &Path,
        remote_dir: &str,
        files: &[String],
    ) -> SchedResult<()> {
        self.record(format!("upload {remote_dir} {}", files.join(",")));
        Ok(())
    }

    async fn download_incremental(
        &self,
        _host: &Host,
        _local_dir: &Path,
        remote_dir: &str,
    ) -> SchedResult<()> {
        self.record(format!("incremental {remote_dir}"));
        Ok(())
    }

    async fn download_final(
        &self,
        _host: &Host,
        _local_dir: &Path,
        remote_dir: &str,
    ) -> SchedResult<()> {
        self.record(format!("final {remote_dir}"));
        Ok(())
    }
}

/// In-memory host store counting saves.
#[derive(Default)]
pub struct CountingStore {
    saves: AtomicUsize,
    saved: Mutex<Option<Hosts>>,
}

impl CountingStore {
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn saved(&self) -> Option<Hosts> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostStore for CountingStore {
    async fn load(&self) -> SchedResult<Hosts> {
        Ok(self.saved().unwrap_or_default())
    }

    async fn save(&self, hosts: &Hosts) -> SchedResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.saved.lock().unwrap() = Some(hosts.clone());
        Ok(())
    }
}

/// A fully configured host for `kind`.
pub fn cluster(name: &str, kind: SchedulerKind) -> Host {
    let mut host = Host::new(name, format!("login.{name}.example.org"))
        .with_scheduler(kind)
        .with_handler("mpirun")
        .with_corespernode(24);
    host.remoteworkdir = Some("/work/jdoe".to_string());
    host
}
