//! Job orchestrator.
//!
//! Owns the in-flight set. A job id is claimed at most once at a time no
//! matter how many discovery paths report it, and never more than
//! `max_jobs` runs execute concurrently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use reel_db::JobRepository;
use reel_models::JobId;
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::discovery::{run_poller, run_push_listener, PushSettings};
use crate::error::WorkerResult;
use crate::metrics;
use crate::pipeline::JobRunner;

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Started,
    AlreadyInFlight,
    AtCapacity,
    ShuttingDown,
}

pub struct Orchestrator {
    repo: Arc<dyn JobRepository>,
    runner: Arc<dyn JobRunner>,
    max_jobs: usize,
    in_flight: Mutex<HashSet<JobId>>,
    slot_freed: Notify,
    shutdown: watch::Sender<bool>,
}

/// Removes the job from the in-flight set when its task ends, panics included.
struct InFlightGuard {
    orchestrator: Arc<Orchestrator>,
    job_id: JobId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.orchestrator.release(&self.job_id);
    }
}

impl Orchestrator {
    pub fn new(repo: Arc<dyn JobRepository>, runner: Arc<dyn JobRunner>, max_jobs: usize) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            repo,
            runner,
            max_jobs: max_jobs.max(1),
            in_flight: Mutex::new(HashSet::new()),
            slot_freed: Notify::new(),
            shutdown,
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<JobId>> {
        // The set stays consistent even if a holder panicked
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn repo(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().len()
    }

    pub fn is_in_flight(&self, job_id: &JobId) -> bool {
        self.lock().contains(job_id)
    }

    pub fn available_slots(&self) -> usize {
        self.max_jobs.saturating_sub(self.in_flight_count())
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Stop claiming new jobs. In-flight runs continue.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Claim `job_id` and start its run on a new task.
    pub fn claim_and_process(self: &Arc<Self>, job_id: JobId, source: &'static str) -> ClaimOutcome {
        if self.is_shutting_down() {
            return ClaimOutcome::ShuttingDown;
        }

        {
            let mut in_flight = self.lock();
            if in_flight.contains(&job_id) {
                return ClaimOutcome::AlreadyInFlight;
            }
            if in_flight.len() >= self.max_jobs {
                return ClaimOutcome::AtCapacity;
            }
            in_flight.insert(job_id.clone());
            metrics::set_in_flight(in_flight.len());
        }

        metrics::record_claim(source);
        debug!(job_id = %job_id, source, "Claimed job");

        let guard = InFlightGuard {
            orchestrator: Arc::clone(self),
            job_id: job_id.clone(),
        };
        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            let _guard = guard;
            let outcome = runner.run(&job_id).await;
            debug!(job_id = %job_id, ?outcome, "Job run finished");
        });

        ClaimOutcome::Started
    }

    fn release(&self, job_id: &JobId) {
        {
            let mut in_flight = self.lock();
            in_flight.remove(job_id);
            metrics::set_in_flight(in_flight.len());
        }
        self.slot_freed.notify_waiters();
    }

    /// Wait until at least one slot is free.
    pub async fn wait_for_slot(&self) {
        loop {
            let freed = self.slot_freed.notified();
            if self.available_slots() > 0 {
                return;
            }
            freed.await;
        }
    }

    /// Wait until no job is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let freed = self.slot_freed.notified();
            if self.in_flight_count() == 0 {
                return;
            }
            freed.await;
        }
    }

    /// Resume every job left mid-pipeline, oldest first.
    ///
    /// Waits for a free slot before each claim instead of dropping jobs
    /// when at capacity.
    pub async fn recover(self: &Arc<Self>) -> WorkerResult<usize> {
        let jobs = self.repo.list_interrupted().await?;
        if jobs.is_empty() {
            return Ok(0);
        }
        info!(count = jobs.len(), "Recovering interrupted jobs");

        let mut resumed = 0;
        'jobs: for job in jobs {
            loop {
                self.wait_for_slot().await;
                match self.claim_and_process(job.id.clone(), "recovery") {
                    ClaimOutcome::Started => {
                        info!(job_id = %job.id, status = %job.status, "Resuming job");
                        resumed += 1;
                        break;
                    }
                    ClaimOutcome::AlreadyInFlight => break,
                    ClaimOutcome::AtCapacity => continue,
                    ClaimOutcome::ShuttingDown => break 'jobs,
                }
            }
        }
        Ok(resumed)
    }

    /// One sweep of pending jobs, limited to the free slots.
    pub async fn poll_once(self: &Arc<Self>) -> WorkerResult<usize> {
        let available = self.available_slots();
        if available == 0 || self.is_shutting_down() {
            return Ok(0);
        }

        let jobs = self.repo.list_pending(available).await?;
        let started = jobs
            .into_iter()
            .filter(|job| self.claim_and_process(job.id.clone(), "poll") == ClaimOutcome::Started)
            .count();
        if started > 0 {
            info!(started, "Claimed pending jobs from sweep");
        }
        Ok(started)
    }

    /// Recover, then discover jobs until shutdown, then drain.
    pub async fn run(self: Arc<Self>, config: &WorkerConfig) -> WorkerResult<()> {
        info!(max_jobs = self.max_jobs, "Starting job orchestrator");

        if let Err(e) = self.recover().await {
            error!("Recovery sweep failed: {}", e);
        }

        let poller = tokio::spawn(run_poller(Arc::clone(&self), config.poll_interval));
        let listener = tokio::spawn(run_push_listener(
            Arc::clone(&self),
            PushSettings {
                backoff: config.resubscribe_backoff,
                subscribe_timeout: config.subscribe_timeout,
            },
        ));

        let mut shutdown = self.shutdown_signal();
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("Shutdown signal received, no longer claiming jobs");

        let _ = poller.await;
        let _ = listener.await;

        self.drain(config.shutdown_timeout).await;
        info!("Job orchestrator stopped");
        Ok(())
    }

    /// Wait for in-flight runs, up to `timeout`.
    pub async fn drain(&self, timeout: Duration) {
        let remaining = self.in_flight_count();
        if remaining == 0 {
            return;
        }
        info!(remaining, "Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(timeout, self.wait_idle()).await.is_err() {
            warn!(
                remaining = self.in_flight_count(),
                "Shutdown timeout reached with jobs still running; they will be recovered on restart"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_db::MemoryJobRepository;
    use reel_models::{Job, JobStatus, TargetDuration};
    use tokio::sync::Semaphore;

    use crate::pipeline::JobOutcome;

    /// Holds every run until a permit is released.
    struct GatedRunner {
        gate: Semaphore,
        started: Mutex<Vec<JobId>>,
    }

    impl GatedRunner {
        fn new(permits: usize) -> Arc<Self> {
            Arc::new(Self {
                gate: Semaphore::new(permits),
                started: Mutex::new(Vec::new()),
            })
        }

        fn started(&self) -> Vec<JobId> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, job_id: &JobId) -> JobOutcome {
            self.started.lock().unwrap().push(job_id.clone());
            let permit = self.gate.acquire().await.unwrap();
            permit.forget();
            JobOutcome::Completed
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl JobRunner for PanickingRunner {
        async fn run(&self, _job_id: &JobId) -> JobOutcome {
            panic!("runner exploded");
        }
    }

    fn job_with(status: JobStatus, offset_secs: i64) -> Job {
        let mut job = Job::new("user-1", "Octopuses", TargetDuration::Short, "en-US-GuyNeural", "minecraft");
        job.status = status;
        job.created_at = job.created_at + chrono::Duration::seconds(offset_secs);
        job
    }

    #[tokio::test]
    async fn test_claim_outcomes() {
        let repo = Arc::new(MemoryJobRepository::new());
        let runner = GatedRunner::new(0);
        let orch = Orchestrator::new(repo, runner.clone(), 2);

        let a = JobId::from_string("a");
        let b = JobId::from_string("b");
        let c = JobId::from_string("c");

        assert_eq!(orch.claim_and_process(a.clone(), "push"), ClaimOutcome::Started);
        assert_eq!(orch.claim_and_process(a.clone(), "poll"), ClaimOutcome::AlreadyInFlight);
        assert_eq!(orch.claim_and_process(b.clone(), "poll"), ClaimOutcome::Started);
        assert_eq!(orch.claim_and_process(c.clone(), "poll"), ClaimOutcome::AtCapacity);
        assert_eq!(orch.available_slots(), 0);

        runner.gate.add_permits(1);
        orch.wait_for_slot().await;
        assert_eq!(orch.in_flight_count(), 1);
        assert_eq!(orch.claim_and_process(c.clone(), "poll"), ClaimOutcome::Started);

        orch.shutdown();
        assert_eq!(
            orch.claim_and_process(JobId::from_string("d"), "push"),
            ClaimOutcome::ShuttingDown
        );

        runner.gate.add_permits(2);
        orch.wait_idle().await;
        assert!(!orch.is_in_flight(&a));
    }

    #[tokio::test]
    async fn test_panicking_run_frees_slot() {
        let repo = Arc::new(MemoryJobRepository::new());
        let orch = Orchestrator::new(repo, Arc::new(PanickingRunner), 1);

        let id = JobId::from_string("boom");
        assert_eq!(orch.claim_and_process(id.clone(), "push"), ClaimOutcome::Started);
        orch.wait_idle().await;
        assert!(!orch.is_in_flight(&id));
        assert_eq!(orch.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_poll_once_respects_free_slots() {
        let repo = Arc::new(MemoryJobRepository::new());
        let oldest = job_with(JobStatus::Pending, -30);
        let middle = job_with(JobStatus::Pending, -20);
        let newest = job_with(JobStatus::Pending, -10);
        for job in [&newest, &oldest, &middle] {
            repo.seed((*job).clone());
        }

        let runner = GatedRunner::new(0);
        let orch = Orchestrator::new(repo, runner.clone(), 2);

        assert_eq!(orch.poll_once().await.unwrap(), 2);
        assert!(orch.is_in_flight(&oldest.id));
        assert!(orch.is_in_flight(&middle.id));
        assert!(!orch.is_in_flight(&newest.id));

        // No free slot, nothing is listed
        assert_eq!(orch.poll_once().await.unwrap(), 0);

        runner.gate.add_permits(10);
        orch.wait_idle().await;
    }

    #[tokio::test]
    async fn test_recover_waits_for_slots_oldest_first() {
        let repo = Arc::new(MemoryJobRepository::new());
        let first = job_with(JobStatus::AssemblingVideo, -300);
        let second = job_with(JobStatus::GeneratingVoice, -200);
        let third = job_with(JobStatus::Uploading, -100);
        let done = job_with(JobStatus::Completed, -400);
        let pending = job_with(JobStatus::Pending, -500);
        for job in [&third, &done, &first, &pending, &second] {
            repo.seed((*job).clone());
        }

        let runner = GatedRunner::new(0);
        let orch = Orchestrator::new(repo, runner.clone(), 1);

        let recovering = {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move { orch.recover().await })
        };

        // Release runs one at a time while recovery waits for each slot
        runner.gate.add_permits(3);
        let resumed = recovering.await.unwrap().unwrap();
        orch.wait_idle().await;

        assert_eq!(resumed, 3);
        assert_eq!(runner.started(), vec![first.id, second.id, third.id]);
    }

    #[tokio::test]
    async fn test_recover_stops_on_shutdown() {
        let repo = Arc::new(MemoryJobRepository::new());
        repo.seed(job_with(JobStatus::FittingAudio, -10));
        let orch = Orchestrator::new(repo, GatedRunner::new(1), 1);

        orch.shutdown();
        assert_eq!(orch.recover().await.unwrap(), 0);
        assert_eq!(orch.in_flight_count(), 0);
    }
}
