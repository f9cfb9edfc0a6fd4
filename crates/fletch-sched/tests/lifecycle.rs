//! Lifecycle tests: detection, submission and the poll loop against a
//! scripted remote executor.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CountingStore, MockExecutor, RecordingStager, Reply, cluster};
use fletch_sched::{
    Host, HostStore, Hosts, Job, JobPhase, JobStatus, MonitorConfig, NoopStager, Orchestrator,
    ProbePolicy, RunContext, SchedError, SchedulerKind, Walltime, YamlHostStore,
};

fn orchestrator(
    executor: Arc<MockExecutor>,
    stager: Arc<RecordingStager>,
    store: Arc<CountingStore>,
    hosts: Hosts,
    jobs: Vec<Job>,
) -> Orchestrator {
    Orchestrator::new(RunContext::new(executor, stager, store), hosts, jobs)
}

#[tokio::test(start_paused = true)]
async fn test_pbs_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(
        MockExecutor::new()
            .on("qsub", [Reply::ok("12345.sdb\n")])
            .on(
                "qstat",
                [
                    Reply::ok("12345.sdb  md  jdoe  0  Q  standard\n"),
                    Reply::ok("12345.sdb  md  jdoe  00:01:10  R  standard\n"),
                    Reply::Fail,
                ],
            ),
    );
    let stager = Arc::new(RecordingStager::default());
    let store = Arc::new(CountingStore::default());

    let hosts: Hosts = [cluster("archer", SchedulerKind::Pbs)].into_iter().collect();
    let job = Job::new("md", "archer", "pmemd.MPI -O -i md.in")
        .with_batch(1)
        .with_cores(24)
        .with_corespernode(24)
        .with_maxtime(Walltime::parse("24:00:00").unwrap())
        .with_frequency(60)
        .with_localworkdir(dir.path());

    let mut orch = orchestrator(executor.clone(), stager.clone(), store.clone(), hosts, vec![job]);
    let report = orch.run().await.unwrap();

    let script = std::fs::read_to_string(dir.path().join("submit.pbs")).unwrap();
    let select_lines: Vec<_> = script
        .lines()
        .filter(|l| l.starts_with("#PBS -l select="))
        .collect();
    assert_eq!(select_lines, ["#PBS -l select=1:ncpus=24:mpiprocs=24"]);
    assert!(script.contains("#PBS -l walltime=24:00:00\n"));

    assert_eq!(report.passes, 3);
    let outcome = &report.jobs[0];
    assert_eq!(outcome.jobid.as_deref(), Some("12345"));
    assert_eq!(outcome.status, Some(JobStatus::Finished));
    assert_eq!(outcome.phase, JobPhase::Finished);
    assert!(outcome.error.is_none());

    let submit = executor
        .calls()
        .into_iter()
        .find(|(_, cmds)| cmds.last().is_some_and(|c| c.starts_with("qsub")))
        .unwrap();
    assert_eq!(submit.1, ["cd /work/jdoe/md", "qsub submit.pbs"]);
    assert_eq!(executor.count("qstat | grep -w 12345"), 3);

    assert_eq!(
        stager.events(),
        [
            "upload /work/jdoe/md submit.pbs",
            "incremental /work/jdoe/md",
            "final /work/jdoe/md",
        ]
    );
    assert_eq!(store.saves(), 0);
    assert!(orch.jobs()[0].job.finished_at.is_some());
    assert!(orch.jobs()[0].job.submitted_at.is_some());
}

#[tokio::test]
async fn test_sge_detection_persisted_once() {
    let executor = Arc::new(
        MockExecutor::new()
            .on("env | grep -i 'sge'", [Reply::ok("SGE_ROOT=/opt/sge\n")])
            .on("which mpirun", [Reply::ok("/usr/bin/mpirun\n")]),
    );
    let store = Arc::new(CountingStore::default());
    let mut host = Host::new("arc", "arc.leeds.ac.uk");
    host.corespernode = Some(16);
    let hosts: Hosts = [host].into_iter().collect();
    let jobs = vec![
        Job::new("a", "arc", "gmx mdrun"),
        Job::new("b", "arc", "gmx mdrun"),
    ];

    let mut orch = orchestrator(
        executor.clone(),
        Arc::new(RecordingStager::default()),
        store.clone(),
        hosts,
        jobs,
    );

    let reports = orch.detect().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].scheduler, Some(SchedulerKind::Sge));
    let probes_after_first = executor.calls().len();
    assert_eq!(executor.count("env | grep -i 'pbs'"), 1);
    assert_eq!(executor.count("env | grep -i 'lsf'"), 1);
    assert_eq!(executor.count("which sbatch"), 0);

    let reports = orch.detect().await.unwrap();
    assert!(reports.is_empty());
    assert_eq!(executor.calls().len(), probes_after_first);

    assert_eq!(store.saves(), 1);
    let saved = store.saved().unwrap();
    let arc = saved.get("arc").unwrap();
    assert_eq!(arc.scheduler, Some(SchedulerKind::Sge));
    assert_eq!(arc.handler.as_deref(), Some("mpirun"));
    assert_eq!(orch.hosts().get("arc").unwrap().scheduler, Some(SchedulerKind::Sge));
}

#[tokio::test]
async fn test_blank_host_fields_are_detected_and_saved() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hosts.yaml");
    std::fs::write(
        &path,
        "lumi:\n  host: lumi.csc.fi\n  scheduler: \"\"\n  handler: \"\"\n",
    )
    .unwrap();

    let executor = Arc::new(
        MockExecutor::new()
            .on("which sbatch", [Reply::ok("/usr/bin/sbatch\n")])
            .on("which srun", [Reply::ok("/usr/bin/srun\n")]),
    );
    let store = Arc::new(YamlHostStore::new(&path));
    let hosts = store.load().await.unwrap();
    let mut orch = Orchestrator::new(
        RunContext::new(executor.clone(), Arc::new(NoopStager), store.clone()),
        hosts,
        vec![Job::new("md", "lumi", "gmx mdrun")],
    );

    let reports = orch.detect().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(executor.count("which sbatch"), 1);

    let reloaded = store.load().await.unwrap();
    let lumi = reloaded.get("lumi").unwrap();
    assert_eq!(lumi.scheduler, Some(SchedulerKind::Slurm));
    assert_eq!(lumi.handler.as_deref(), Some("srun"));
}

#[tokio::test]
async fn test_exhaustive_detection_runs_every_probe() {
    let executor = Arc::new(
        MockExecutor::new()
            .on("which sbatch", [Reply::ok("/usr/bin/sbatch\n")])
            .on("which aprun", [Reply::ok("/opt/cray/bin/aprun\n")])
            .on("which srun", [Reply::ok("/usr/bin/srun\n")]),
    );
    let store = Arc::new(CountingStore::default());
    let hosts: Hosts = [Host::new("cray", "cray.example.org")].into_iter().collect();
    let mut orch = orchestrator(
        executor.clone(),
        Arc::new(RecordingStager::default()),
        store.clone(),
        hosts,
        vec![Job::new("md", "cray", "gmx mdrun")],
    )
    .with_probe_policy(ProbePolicy::Exhaustive);

    orch.detect().await.unwrap();
    assert_eq!(executor.count("which mpirun"), 1);
    assert_eq!(executor.count("which srun"), 1);

    let cray = orch.hosts().get("cray").unwrap();
    assert_eq!(cray.scheduler, Some(SchedulerKind::Slurm));
    assert_eq!(cray.handler.as_deref(), Some("aprun"));
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_detection_failure_fails_at_prepare() {
    let executor = Arc::new(MockExecutor::new());
    let store = Arc::new(CountingStore::default());
    let hosts: Hosts = [Host::new("bare", "bare.example.org")].into_iter().collect();
    let mut orch = orchestrator(
        executor,
        Arc::new(RecordingStager::default()),
        store.clone(),
        hosts,
        vec![Job::new("md", "bare", "pmemd").with_cores(4)],
    );

    let reports = orch.detect().await.unwrap();
    assert_eq!(reports[0].missing, ["scheduler", "launcher"]);
    assert_eq!(store.saves(), 0);

    let failures = orch.prepare_all().await;
    assert!(matches!(failures[0], SchedError::SchedulerUnset { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_poll_loop_terminates_with_shared_cadence() {
    let executor = Arc::new(
        MockExecutor::new()
            .on_host("archer", "qstat", [
                Reply::ok("1.sdb  a  jdoe  0  Q  q\n"),
                Reply::ok("1.sdb  a  jdoe  0  R  q\n"),
                Reply::ok(""),
            ])
            .on_host("lumi", "squeue", [
                Reply::ok(" 2  small  b  jdoe  PD  0:00  1  (Priority)\n"),
                Reply::ok(" 2  small  b  jdoe  R  0:10  1  nid001\n"),
                Reply::ok(" 2  small  b  jdoe  CG  0:10  1  nid001\n"),
                Reply::ok(" 2  small  b  jdoe  CD  0:10  1  nid001\n"),
            ]),
    );
    let stager = Arc::new(RecordingStager::default());
    let hosts: Hosts = [
        cluster("archer", SchedulerKind::Pbs),
        cluster("lumi", SchedulerKind::Slurm),
    ]
    .into_iter()
    .collect();

    let mut a = Job::new("a", "archer", "x").with_frequency(30);
    a.jobid = Some("1".to_string());
    let mut b = Job::new("b", "lumi", "y").with_frequency(120);
    b.jobid = Some("2".to_string());

    let mut orch = orchestrator(
        executor.clone(),
        stager.clone(),
        Arc::new(CountingStore::default()),
        hosts,
        vec![a, b],
    );

    let start = tokio::time::Instant::now();
    let report = orch.monitor().await.unwrap();

    assert_eq!(report.passes, 4);
    assert_eq!(start.elapsed(), Duration::from_secs(3 * 120));
    assert!(report.jobs.iter().all(|j| j.status == Some(JobStatus::Finished)));
    // The first job is not polled again once finished.
    assert_eq!(executor.count("qstat"), 3);
    assert_eq!(executor.count("squeue"), 4);

    let events = stager.events();
    assert_eq!(events.iter().filter(|e| e.starts_with("incremental")).count(), 2);
    assert_eq!(events.iter().filter(|e| e.starts_with("final")).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_marks_job_errored() {
    let executor = Arc::new(
        MockExecutor::new()
            .on_host("archer", "qstat", [Reply::Down])
            .on_host("lumi", "squeue", [
                Reply::ok(" 2  small  b  jdoe  R  0:10  1  nid001\n"),
                Reply::Fail,
            ]),
    );
    let hosts: Hosts = [
        cluster("archer", SchedulerKind::Pbs),
        cluster("lumi", SchedulerKind::Slurm),
    ]
    .into_iter()
    .collect();
    let mut a = Job::new("a", "archer", "x");
    a.jobid = Some("1".to_string());
    let mut b = Job::new("b", "lumi", "y");
    b.jobid = Some("2".to_string());

    let mut orch = orchestrator(
        executor,
        Arc::new(RecordingStager::default()),
        Arc::new(CountingStore::default()),
        hosts,
        vec![a, b],
    );
    let report = orch.monitor().await.unwrap();

    assert_eq!(report.passes, 2);
    let failed: Vec<_> = report.failed().map(|j| j.name.as_str()).collect();
    assert_eq!(failed, ["a"]);
    assert_eq!(report.jobs[0].status, Some(JobStatus::Finished));
    assert!(report.jobs[0].error.as_deref().unwrap().contains("Status query"));
    assert_eq!(report.jobs[1].status, Some(JobStatus::Finished));
    assert!(report.jobs[1].error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_monitor_max_wait() {
    let executor = Arc::new(
        MockExecutor::new().on("qstat", [Reply::ok("7.sdb  a  jdoe  0  Q  q\n")]),
    );
    let hosts: Hosts = [cluster("archer", SchedulerKind::Pbs)].into_iter().collect();
    let mut job = Job::new("a", "archer", "x").with_frequency(300);
    job.jobid = Some("7".to_string());

    let mut orch = orchestrator(
        executor,
        Arc::new(RecordingStager::default()),
        Arc::new(CountingStore::default()),
        hosts,
        vec![job],
    )
    .with_monitor_config(MonitorConfig {
        max_wait: Some(Duration::from_secs(900)),
    });

    let err = orch.monitor().await.unwrap_err();
    assert!(matches!(err, SchedError::Timeout(_)));
    assert_eq!(orch.jobs()[0].job.laststatus, Some(JobStatus::Queued));
    assert!(orch.jobs()[0].is_pending());
}

#[tokio::test]
async fn test_submit_failure_does_not_block_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(
        MockExecutor::new()
            .on("bsub", [Reply::ok("Job <991> is submitted to queue <normal>.\n")])
            .on("qsub", [Reply::ok("qsub: Unknown queue\n")]),
    );
    let hosts: Hosts = [
        cluster("archer", SchedulerKind::Pbs),
        cluster("hartree", SchedulerKind::Lsf),
    ]
    .into_iter()
    .collect();
    let jobs = vec![
        Job::new("a", "archer", "x")
            .with_cores(24)
            .with_localworkdir(dir.path().join("a")),
        Job::new("b", "hartree", "y")
            .with_cores(24)
            .with_localworkdir(dir.path().join("b")),
    ];

    let mut orch = Orchestrator::new(
        RunContext::new(executor, Arc::new(NoopStager), Arc::new(CountingStore::default())),
        hosts,
        jobs,
    );
    assert!(orch.prepare_all().await.is_empty());
    assert!(orch.stage_all().await.is_empty());
    let failures = orch.submit_all().await;

    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], SchedError::Submission { .. }));
    assert_eq!(orch.jobs()[0].phase, JobPhase::Finished);
    assert_eq!(orch.jobs()[1].phase, JobPhase::Submitted);
    assert_eq!(orch.jobs()[1].job.jobid.as_deref(), Some("991"));
}

#[tokio::test]
async fn test_remote_values_are_shell_quoted() {
    let dir = tempfile::tempdir().unwrap();
    let executor = Arc::new(
        MockExecutor::new()
            .on("sbatch", [Reply::ok("Submitted batch job 7\n")])
            .on("squeue", [Reply::Fail])
            .on("scancel", [Reply::ok("")]),
    );
    let mut host = cluster("lumi", SchedulerKind::Slurm);
    host.remoteworkdir = Some("/work/my project".to_string());
    host.user = Some("j doe".to_string());
    let hosts: Hosts = [host].into_iter().collect();
    let job = Job::new("md", "lumi", "gmx mdrun")
        .with_cores(24)
        .with_localworkdir(dir.path());

    let mut orch = orchestrator(
        executor.clone(),
        Arc::new(RecordingStager::default()),
        Arc::new(CountingStore::default()),
        hosts,
        vec![job],
    );
    assert!(orch.prepare_all().await.is_empty());
    assert!(orch.submit_all().await.is_empty());

    let submit = executor
        .calls()
        .into_iter()
        .find(|(_, cmds)| cmds.last().is_some_and(|c| c.starts_with("sbatch")))
        .unwrap();
    assert_eq!(submit.1[0], "cd '/work/my project/md'");

    orch.query_status("lumi", "7; rm -rf ~").await.unwrap();
    assert_eq!(executor.count("squeue -u 'j doe' | grep -w '7; rm -rf ~'"), 1);

    orch.delete_job("lumi", "7 8").await.unwrap();
    assert_eq!(executor.count("scancel '7 8'"), 1);
}

#[tokio::test]
async fn test_delete_all() {
    let executor = Arc::new(
        MockExecutor::new()
            .on("scancel", [Reply::ok("")])
            .on("bkill", [Reply::ok("Job <5> is being terminated\n")]),
    );
    let hosts: Hosts = [
        cluster("lumi", SchedulerKind::Slurm),
        cluster("hartree", SchedulerKind::Lsf),
    ]
    .into_iter()
    .collect();
    let mut a = Job::new("a", "lumi", "x");
    a.jobid = Some("4".to_string());
    let mut b = Job::new("b", "hartree", "y");
    b.jobid = Some("5".to_string());
    let c = Job::new("c", "lumi", "z");

    let mut orch = orchestrator(
        executor.clone(),
        Arc::new(RecordingStager::default()),
        Arc::new(CountingStore::default()),
        hosts,
        vec![a, b, c],
    );
    assert!(orch.delete_all().await.is_empty());

    assert_eq!(executor.count("scancel 4"), 1);
    assert_eq!(executor.count("bkill 5"), 1);
    assert_eq!(executor.calls().len(), 2);
    assert_eq!(orch.jobs()[0].phase, JobPhase::Finished);
    assert_eq!(orch.jobs()[1].job.laststatus, Some(JobStatus::Finished));
    assert_eq!(orch.jobs()[2].phase, JobPhase::Unprepared);
}
