//! Priority job scheduler with bounded concurrency.
//!
//! [`Scheduler`] is a cheap, cloneable handle. Submissions are inspected on
//! the caller's task, then handed to a single admission loop over an
//! unbounded command channel. The loop owns the priority queue and the
//! running count; finished jobs report back over the same channel, so
//! every admission decision is made in one place, in arrival order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hf_core::config::Config;
use hf_core::events::{EventBus, EventPayload};
use hf_core::{Error, JobId, MetadataInspector, Result, SourceInfo};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ladder::LADDER;
use crate::layout::PackageLayout;
use crate::pipeline::{JobOutcome, PackagePipeline, PipelineJob};

/// Admission order: shorter sources first, then lower resolution tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PriorityKey {
    pub duration_ms: u64,
    pub tier_rank: u32,
}

impl PriorityKey {
    pub fn for_source(info: &SourceInfo) -> Self {
        let duration_ms = if info.duration_secs.is_finite() && info.duration_secs > 0.0 {
            (info.duration_secs * 1000.0).round() as u64
        } else {
            0
        };
        Self {
            duration_ms,
            tier_rank: tier_rank(info.height),
        }
    }
}

/// Index of the smallest ladder tier that covers `height`.
fn tier_rank(height: u32) -> u32 {
    let rank = LADDER
        .iter()
        .position(|t| height <= t.height)
        .unwrap_or(LADDER.len());
    rank as u32
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_concurrent_jobs: usize,
    pub output_root: PathBuf,
    pub watch_roots: Vec<PathBuf>,
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_jobs: config.packaging.effective_max_concurrent_jobs(),
            output_root: config.packaging.output_root.clone(),
            watch_roots: config.watch.paths.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Admitted,
    Running,
}

/// A live job as reported by [`Scheduler::jobs`].
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: JobId,
    pub source: PathBuf,
    pub package_dir: PathBuf,
    pub key: PriorityKey,
    pub state: JobState,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub completed: u64,
    pub failed: u64,
}

/// Returned by [`Scheduler::submit`]; resolves once the job terminates.
#[derive(Debug)]
pub struct JobHandle {
    pub id: JobId,
    pub key: PriorityKey,
    pub package_dir: PathBuf,
    outcome: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub async fn wait(self) -> JobOutcome {
        self.outcome
            .await
            .unwrap_or_else(|_| JobOutcome::failed("scheduler dropped the job"))
    }
}

struct Ticket {
    job: PipelineJob,
    key: PriorityKey,
    submitted_at: DateTime<Utc>,
    outcome: oneshot::Sender<JobOutcome>,
}

struct Queued {
    seq: u64,
    ticket: Ticket,
}

impl Queued {
    fn order(&self) -> (PriorityKey, u64) {
        (self.ticket.key, self.seq)
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.order() == other.order()
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order().cmp(&other.order())
    }
}

enum Command {
    Enqueue(Ticket),
    Finished { completed: bool },
}

/// Shared state between handles and the admission loop.
struct Shared {
    inspector: Arc<dyn MetadataInspector>,
    config: SchedulerConfig,
    events: Arc<EventBus>,
    /// Package dir -> job, for every queued or running job.
    active: DashMap<PathBuf, JobId>,
    jobs: DashMap<JobId, JobSummary>,
}

impl Shared {
    fn release(&self, id: JobId, package_dir: &Path) {
        self.active.remove_if(package_dir, |_, owner| *owner == id);
        self.jobs.remove(&id);
    }

    fn set_state(&self, id: JobId, state: JobState) {
        if let Some(mut job) = self.jobs.get_mut(&id) {
            job.state = state;
        }
    }
}

/// A package dir claimed by an in-progress `submit`.
struct Claim<'a> {
    shared: &'a Shared,
    id: JobId,
    package_dir: PathBuf,
    armed: bool,
}

impl Claim<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release(self.id, &self.package_dir);
        }
    }
}

/// Handle to the scheduler. Clone freely.
#[derive(Clone)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    stats: watch::Receiver<SchedulerStats>,
}

impl Scheduler {
    /// Spawn the admission loop.
    ///
    /// The loop runs until `cancel` fires (or every handle is dropped).
    /// On cancellation queued jobs fail with "scheduler shut down" and the
    /// returned task completes once running jobs have finished.
    pub fn start(
        mut config: SchedulerConfig,
        inspector: Arc<dyn MetadataInspector>,
        pipeline: Arc<PackagePipeline>,
        events: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> (Self, JoinHandle<()>) {
        config.max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        // Sources are canonicalized on submit; roots must match.
        config.watch_roots = config
            .watch_roots
            .iter()
            .map(|root| std::fs::canonicalize(root).unwrap_or_else(|_| root.clone()))
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(SchedulerStats {
            max_concurrent: config.max_concurrent_jobs,
            ..Default::default()
        });

        let shared = Arc::new(Shared {
            inspector,
            config,
            events,
            active: DashMap::new(),
            jobs: DashMap::new(),
        });

        let admission = Admission {
            rx,
            done_tx: tx.downgrade(),
            pipeline,
            shared: shared.clone(),
            stats: stats_tx,
            queue: BinaryHeap::new(),
            running: 0,
            seq: 0,
            completed: 0,
            failed: 0,
        };
        let task = tokio::spawn(admission.run(cancel));

        (
            Self {
                tx,
                shared,
                stats: stats_rx,
            },
            task,
        )
    }

    /// Submit a source file for packaging.
    ///
    /// Fails immediately, without queueing, when the file is missing, the
    /// inspector rejects it, or a job for the same package is already
    /// queued or running.
    pub async fn submit(&self, source: &Path) -> Result<JobHandle> {
        let source = tokio::fs::canonicalize(source)
            .await
            .map_err(|_| Error::not_found("source", source.display()))?;
        if !tokio::fs::metadata(&source).await?.is_file() {
            return Err(Error::Validation(format!("{} is not a file", source.display())));
        }

        let config = &self.shared.config;
        let layout = PackageLayout::for_source(&config.output_root, &config.watch_roots, &source);
        let package_dir = layout.dir().to_path_buf();
        let id = JobId::new();

        match self.shared.active.entry(package_dir.clone()) {
            Entry::Occupied(existing) => {
                return Err(Error::Conflict(format!(
                    "{} is already being packaged by job {}",
                    source.display(),
                    existing.get()
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        // Released on every early return, and if this future is dropped
        // while inspecting.
        let claim = Claim {
            shared: &self.shared,
            id,
            package_dir: package_dir.clone(),
            armed: true,
        };

        let info = match self.shared.inspector.inspect(&source).await {
            Ok(info) if info.height > 0 => info,
            Ok(_) => {
                return Err(Error::Probe(format!(
                    "{}: video track has no height",
                    source.display()
                )));
            }
            Err(e) => {
                tracing::warn!(source = %source.display(), "Rejected: {e}");
                return Err(e);
            }
        };

        let key = PriorityKey::for_source(&info);
        let submitted_at = Utc::now();
        let (outcome_tx, outcome_rx) = oneshot::channel();

        self.shared.jobs.insert(
            id,
            JobSummary {
                id,
                source: source.clone(),
                package_dir: package_dir.clone(),
                key,
                state: JobState::Queued,
                submitted_at,
            },
        );
        self.shared.events.publish(EventPayload::JobQueued {
            job_id: id,
            source: source.clone(),
            duration_ms: key.duration_ms,
            tier_rank: key.tier_rank,
        });

        let ticket = Ticket {
            job: PipelineJob {
                id,
                source,
                info,
                layout,
            },
            key,
            submitted_at,
            outcome: outcome_tx,
        };
        if self.tx.send(Command::Enqueue(ticket)).is_err() {
            return Err(Error::Internal("scheduler is not running".into()));
        }
        // The admission loop owns the release from here on.
        claim.disarm();

        Ok(JobHandle {
            id,
            key,
            package_dir,
            outcome: outcome_rx,
        })
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats.borrow()
    }

    /// Queued and running jobs, in submission order.
    pub fn jobs(&self) -> Vec<JobSummary> {
        let mut jobs: Vec<JobSummary> = self
            .shared
            .jobs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        jobs
    }
}

/// State owned by the admission loop.
struct Admission {
    rx: mpsc::UnboundedReceiver<Command>,
    done_tx: mpsc::WeakUnboundedSender<Command>,
    pipeline: Arc<PackagePipeline>,
    shared: Arc<Shared>,
    stats: watch::Sender<SchedulerStats>,
    queue: BinaryHeap<Reverse<Queued>>,
    running: usize,
    seq: u64,
    completed: u64,
    failed: u64,
}

impl Admission {
    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            max_concurrent = self.shared.config.max_concurrent_jobs,
            "Scheduler started"
        );

        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = self.rx.recv() => command,
            };
            match command {
                Some(command) => self.handle(command),
                None => break,
            }
            self.admit();
            self.publish_stats();
        }

        self.shutdown().await;
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue(ticket) => {
                let seq = self.seq;
                self.seq += 1;
                self.queue.push(Reverse(Queued { seq, ticket }));
            }
            Command::Finished { completed } => {
                self.running = self.running.saturating_sub(1);
                if completed {
                    self.completed += 1;
                } else {
                    self.failed += 1;
                }
            }
        }
    }

    fn admit(&mut self) {
        while self.running < self.shared.config.max_concurrent_jobs {
            let Some(Reverse(next)) = self.queue.pop() else {
                break;
            };
            let Some(done_tx) = self.done_tx.upgrade() else {
                break;
            };
            self.running += 1;
            self.spawn_job(next.ticket, done_tx);
        }
    }

    fn spawn_job(&self, ticket: Ticket, done_tx: mpsc::UnboundedSender<Command>) {
        let Ticket {
            job,
            key,
            submitted_at,
            outcome,
        } = ticket;
        let waited = Utc::now() - submitted_at;

        tracing::info!(
            job_id = %job.id,
            source = %job.source.display(),
            duration_ms = key.duration_ms,
            tier_rank = key.tier_rank,
            waited_ms = waited.num_milliseconds(),
            "Admitted job"
        );
        self.shared.set_state(job.id, JobState::Admitted);
        self.shared.events.publish(EventPayload::JobAdmitted {
            job_id: job.id,
            running: self.running,
        });

        let pipeline = self.pipeline.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            shared.set_state(job.id, JobState::Running);
            let package_dir = job.layout.dir().to_path_buf();
            let job_id = job.id;

            let run = tokio::spawn(async move { pipeline.run(&job).await }).await;
            let result = run.unwrap_or_else(|e| {
                tracing::error!(%job_id, "Pipeline task panicked: {e}");
                JobOutcome::failed(format!("pipeline task panicked: {e}"))
            });

            match &result {
                JobOutcome::Completed(report) => {
                    tracing::info!(
                        %job_id,
                        encoded = ?report.encoded,
                        reused = ?report.reused,
                        "Job completed"
                    );
                    shared.events.publish(EventPayload::JobCompleted {
                        job_id,
                        package_dir: report.package_dir.clone(),
                        encoded: report.encoded.clone(),
                        reused: report.reused.clone(),
                    });
                }
                JobOutcome::Failed { reason, .. } => {
                    tracing::error!(%job_id, "Job failed: {reason}");
                    shared.events.publish(EventPayload::JobFailed {
                        job_id,
                        error: reason.clone(),
                    });
                }
            }

            // Released before the outcome is delivered so the submitter can
            // resubmit straight away.
            shared.release(job_id, &package_dir);
            let completed = result.is_completed();
            // The submitter may have stopped waiting.
            let _ = outcome.send(result);
            let _ = done_tx.send(Command::Finished { completed });
        });
    }

    fn publish_stats(&self) {
        self.stats.send_replace(SchedulerStats {
            queued: self.queue.len(),
            running: self.running,
            max_concurrent: self.shared.config.max_concurrent_jobs,
            completed: self.completed,
            failed: self.failed,
        });
    }

    async fn shutdown(&mut self) {
        let dropped = self.queue.len();
        for Reverse(queued) in self.queue.drain() {
            let Ticket { job, outcome, .. } = queued.ticket;
            self.shared.release(job.id, job.layout.dir());
            let _ = outcome.send(JobOutcome::failed("scheduler shut down"));
        }
        if dropped > 0 {
            tracing::info!("Scheduler stopping; dropped {dropped} queued job(s)");
        }

        // Running jobs hold senders, so the channel stays open until they
        // report back.
        while self.running > 0 {
            match self.rx.recv().await {
                Some(Command::Finished { completed }) => {
                    self.handle(Command::Finished { completed })
                }
                Some(Command::Enqueue(ticket)) => {
                    self.shared.release(ticket.job.id, ticket.job.layout.dir());
                    let _ = ticket.outcome.send(JobOutcome::failed("scheduler shut down"));
                }
                None => break,
            }
            self.publish_stats();
        }
        self.publish_stats();
        tracing::info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::FsCompletionProber;
    use crate::encoder::RenditionEncoder;
    use crate::ladder::QualityProfile;
    use crate::progress::ProgressBoard;
    use crate::testing::{ScriptedEngine, TableInspector};
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use hf_core::config::FailurePolicy;
    use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
    use std::time::Duration;

    /// Never answers its first inspection; later ones go to `inner`.
    struct StallsOnce {
        stalled: AtomicBool,
        inner: TableInspector,
    }

    #[async_trait]
    impl MetadataInspector for StallsOnce {
        fn name(&self) -> &'static str {
            "stalls-once"
        }

        async fn inspect(&self, path: &Path) -> Result<SourceInfo> {
            if !self.stalled.swap(true, AtomicOrdering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.inner.inspect(path).await
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        engine: Arc<ScriptedEngine>,
        scheduler: Scheduler,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    }

    impl Harness {
        fn new(max: usize, inspector: impl MetadataInspector + 'static) -> Self {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir_all(dir.path().join("in")).unwrap();
            let engine = Arc::new(ScriptedEngine::new());
            let events = Arc::new(EventBus::default());
            let encoder = RenditionEncoder::new(engine.clone(), ProgressBoard::new(), events.clone());
            let pipeline = Arc::new(PackagePipeline::new(
                Arc::new(FsCompletionProber),
                encoder,
                QualityProfile::Medium,
                FailurePolicy::Continue,
                events.clone(),
            ));
            let cancel = CancellationToken::new();
            let (scheduler, task) = Scheduler::start(
                SchedulerConfig {
                    max_concurrent_jobs: max,
                    output_root: dir.path().join("out"),
                    watch_roots: vec![dir.path().join("in")],
                },
                Arc::new(inspector),
                pipeline,
                events,
                cancel.clone(),
            );
            Self {
                dir,
                engine,
                scheduler,
                cancel,
                task,
            }
        }

        fn source(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join("in").join(name);
            std::fs::write(&path, b"video").unwrap();
            std::fs::canonicalize(path).unwrap()
        }
    }

    #[test]
    fn priority_key_orders_duration_then_tier() {
        let short_hd = PriorityKey::for_source(&SourceInfo {
            width: 1920,
            height: 1080,
            duration_secs: 60.0,
            bitrate: None,
        });
        let long_sd = PriorityKey::for_source(&SourceInfo {
            width: 854,
            height: 480,
            duration_secs: 300.0,
            bitrate: None,
        });
        assert!(short_hd < long_sd);
        assert_eq!(short_hd.tier_rank, 2);
        assert_eq!(long_sd.tier_rank, 0);
    }

    #[test]
    fn tier_rank_values() {
        assert_eq!(tier_rank(360), 0);
        assert_eq!(tier_rank(480), 0);
        assert_eq!(tier_rank(1000), 2);
        assert_eq!(tier_rank(2160), 4);
        assert_eq!(tier_rank(4320), 5);
    }

    #[test]
    fn queue_breaks_ties_by_arrival() {
        let key = PriorityKey {
            duration_ms: 1000,
            tier_rank: 1,
        };
        let ticket = |seq| {
            let (tx, _rx) = oneshot::channel();
            Reverse(Queued {
                seq,
                ticket: Ticket {
                    job: PipelineJob {
                        id: JobId::new(),
                        source: PathBuf::from("/a.mp4"),
                        info: SourceInfo {
                            width: 1280,
                            height: 720,
                            duration_secs: 1.0,
                            bitrate: None,
                        },
                        layout: PackageLayout::new("/out/a"),
                    },
                    key,
                    submitted_at: Utc::now(),
                    outcome: tx,
                },
            })
        };
        let mut heap = BinaryHeap::new();
        heap.push(ticket(2));
        heap.push(ticket(0));
        heap.push(ticket(1));
        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|Reverse(q)| q.seq)).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn shorter_job_is_admitted_first() {
        let h = Harness::new(
            1,
            TableInspector::default()
                .with("blocker.mp4", 480, 10.0)
                .with("a.mp4", 480, 300.0)
                .with("b.mp4", 1080, 60.0),
        );
        let blocker = h.source("blocker.mp4");
        let gate = h.engine.gate(&blocker);

        let first = h.scheduler.submit(&blocker).await.unwrap();
        let a = h.scheduler.submit(&h.source("a.mp4")).await.unwrap();
        let b = h.scheduler.submit(&h.source("b.mp4")).await.unwrap();
        gate.notify_one();

        assert!(first.wait().await.is_completed());
        assert!(a.wait().await.is_completed());
        assert!(b.wait().await.is_completed());

        let order: Vec<String> = h
            .engine
            .inputs()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(order, vec!["blocker.mp4", "b.mp4", "a.mp4"]);
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected() {
        let h = Harness::new(1, TableInspector::default().with("clip.mp4", 720, 30.0));
        let clip = h.source("clip.mp4");
        let gate = h.engine.gate(&clip);

        let handle = h.scheduler.submit(&clip).await.unwrap();
        let err = h.scheduler.submit(&clip).await.unwrap_err();
        assert_matches!(err, Error::Conflict(_));

        gate.notify_one();
        assert!(handle.wait().await.is_completed());

        // Once finished the source can be submitted again (and is a no-op).
        let again = h.scheduler.submit(&clip).await.unwrap().wait().await;
        let report = assert_matches!(again, JobOutcome::Completed(r) => r);
        assert!(report.already_complete);
    }

    #[tokio::test]
    async fn probe_failure_rejects_without_queueing() {
        let h = Harness::new(1, TableInspector::default());
        let err = h.scheduler.submit(&h.source("audio.mp3")).await.unwrap_err();
        assert_matches!(err, Error::Probe(_));
        assert!(h.scheduler.jobs().is_empty());
        assert_eq!(h.scheduler.stats().queued, 0);

        // The rejected source is not left marked as in flight.
        let err = h.scheduler.submit(&h.source("audio.mp3")).await.unwrap_err();
        assert_matches!(err, Error::Probe(_));
    }

    #[tokio::test]
    async fn abandoned_submit_releases_its_source() {
        let h = Harness::new(
            1,
            StallsOnce {
                stalled: AtomicBool::new(false),
                inner: TableInspector::default().with("clip.mp4", 720, 30.0),
            },
        );
        let clip = h.source("clip.mp4");

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), h.scheduler.submit(&clip)).await;
        assert!(abandoned.is_err());
        assert!(h.scheduler.shared.active.is_empty());

        let handle = h.scheduler.submit(&clip).await.unwrap();
        assert!(handle.wait().await.is_completed());
    }

    #[tokio::test]
    async fn directory_is_not_a_source() {
        let h = Harness::new(1, TableInspector::default());
        let err = h.scheduler.submit(&h.dir.path().join("in")).await.unwrap_err();
        assert_matches!(err, Error::Validation(_));
        assert!(h.scheduler.shared.active.is_empty());
    }

    #[tokio::test]
    async fn missing_source_is_not_found() {
        let h = Harness::new(1, TableInspector::default());
        let err = h
            .scheduler
            .submit(&h.dir.path().join("in/nope.mp4"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::NotFound { .. });
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let h = Harness::new(
            2,
            TableInspector::default()
                .with("one.mp4", 480, 10.0)
                .with("two.mp4", 480, 20.0)
                .with("three.mp4", 480, 30.0),
        );
        let one = h.source("one.mp4");
        let two = h.source("two.mp4");
        let gate_one = h.engine.gate(&one);
        let gate_two = h.engine.gate(&two);

        let handles = vec![
            h.scheduler.submit(&one).await.unwrap(),
            h.scheduler.submit(&two).await.unwrap(),
            h.scheduler.submit(&h.source("three.mp4")).await.unwrap(),
        ];

        // Wait for the loop to settle with two admitted and one queued.
        let mut stats = h.scheduler.stats.clone();
        stats
            .wait_for(|s| s.running == 2 && s.queued == 1)
            .await
            .unwrap();
        assert!(h.engine.inputs().iter().all(|p| !p.ends_with("three.mp4")));

        gate_one.notify_one();
        gate_two.notify_one();
        for handle in handles {
            assert!(handle.wait().await.is_completed());
        }
        stats.wait_for(|s| s.completed == 3 && s.running == 0).await.unwrap();
    }

    #[tokio::test]
    async fn category_subdirectory_is_kept() {
        let h = Harness::new(1, TableInspector::default().with("ep1.mp4", 480, 5.0));
        std::fs::create_dir_all(h.dir.path().join("in/shows")).unwrap();
        let ep = h.source("shows/ep1.mp4");

        let handle = h.scheduler.submit(&ep).await.unwrap();
        assert!(handle.package_dir.ends_with("out/shows/ep1"));
        assert!(handle.wait().await.is_completed());
        assert!(h.dir.path().join("out/shows/ep1/master.m3u8").is_file());
    }

    #[tokio::test]
    async fn shutdown_fails_queued_jobs_and_waits_for_running() {
        let h = Harness::new(
            1,
            TableInspector::default()
                .with("running.mp4", 480, 10.0)
                .with("queued.mp4", 480, 20.0),
        );
        let running = h.source("running.mp4");
        let gate = h.engine.gate(&running);

        let running_handle = h.scheduler.submit(&running).await.unwrap();
        let queued_handle = h.scheduler.submit(&h.source("queued.mp4")).await.unwrap();
        let mut stats = h.scheduler.stats.clone();
        stats.wait_for(|s| s.queued == 1).await.unwrap();

        h.cancel.cancel();
        let outcome = queued_handle.wait().await;
        assert_matches!(outcome, JobOutcome::Failed { ref reason, .. } if reason == "scheduler shut down");

        gate.notify_one();
        assert!(running_handle.wait().await.is_completed());
        h.task.await.unwrap();
    }
}
