//! Job discovery: a periodic sweep of pending jobs and a push subscription
//! on new inserts. Both feed the orchestrator's claim path, which dedupes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::orchestrator::{ClaimOutcome, Orchestrator};

/// Tracks consecutive failures to suppress repetitive error logs.
///
/// After `max_logged_failures` consecutive failures, further failures are not
/// logged until a success resets the count.
#[derive(Debug)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.suppressed {
            info!(
                "Recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else {
            if !self.suppressed {
                self.suppressed = true;
                warn!(
                    "Suppressing further failure logs after {} consecutive failures",
                    self.max_logged_failures
                );
            }
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns `false` on shutdown.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => !*shutdown.borrow(),
        _ = shutdown.changed() => false,
    }
}

/// Sweep pending jobs every `interval` until shutdown.
pub async fn run_poller(orchestrator: Arc<Orchestrator>, interval: Duration) {
    let mut shutdown = orchestrator.shutdown_signal();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures = FailureTracker::new(3);

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                metrics::record_discovery_event("poll");
                match orchestrator.poll_once().await {
                    Ok(_) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            warn!("Pending job sweep failed: {}", e);
                        }
                    }
                }
            }
        }
    }
    debug!("Poller stopped");
}

/// Push subscription settings.
#[derive(Debug, Clone, Copy)]
pub struct PushSettings {
    /// Wait before resubscribing after an error
    pub backoff: Duration,
    /// Limit on opening the subscription
    pub subscribe_timeout: Duration,
}

/// Claim jobs as their inserts are announced, resubscribing after errors.
///
/// Claims made here may hit a full orchestrator; the poller picks those up
/// once a slot frees.
pub async fn run_push_listener(orchestrator: Arc<Orchestrator>, settings: PushSettings) {
    let mut shutdown = orchestrator.shutdown_signal();
    let mut failures = FailureTracker::new(3);

    'subscribe: loop {
        if *shutdown.borrow() {
            break;
        }

        let opened = tokio::select! {
            _ = shutdown.changed() => break,
            opened = tokio::time::timeout(settings.subscribe_timeout, orchestrator.repo().subscribe_pending()) => opened,
        };

        let mut subscription = match opened {
            Ok(Ok(subscription)) => {
                failures.record_success();
                info!("Subscribed to pending job notifications");
                subscription
            }
            Ok(Err(e)) => {
                if failures.record_failure() {
                    warn!("Push subscription failed, retrying in {:?}: {}", settings.backoff, e);
                }
                if !sleep_or_shutdown(&mut shutdown, settings.backoff).await {
                    break;
                }
                continue;
            }
            Err(_) => {
                if failures.record_failure() {
                    warn!(
                        "Push subscription timed out after {:?}, retrying in {:?}",
                        settings.subscribe_timeout, settings.backoff
                    );
                }
                if !sleep_or_shutdown(&mut shutdown, settings.backoff).await {
                    break;
                }
                continue;
            }
        };

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break 'subscribe,
                event = subscription.next() => event,
            };

            match event {
                Ok(Some(job_id)) => {
                    metrics::record_discovery_event("push");
                    match orchestrator.claim_and_process(job_id.clone(), "push") {
                        ClaimOutcome::Started => info!(job_id = %job_id, "Claimed job from notification"),
                        ClaimOutcome::ShuttingDown => break 'subscribe,
                        other => debug!(job_id = %job_id, outcome = ?other, "Notification not claimed"),
                    }
                }
                Ok(None) => {
                    warn!("Push subscription closed, resubscribing");
                    break;
                }
                Err(e) => {
                    warn!("Push subscription error, resubscribing: {}", e);
                    break;
                }
            }
        }

        if !sleep_or_shutdown(&mut shutdown, settings.backoff).await {
            break;
        }
    }
    debug!("Push listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reel_db::{DbError, DbResult, JobRepository, JobSubscription, MemoryJobRepository};
    use reel_models::{ArtifactUrls, Job, JobId, JobStatus, TargetDuration};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::pipeline::{JobOutcome, JobRunner};

    #[derive(Default)]
    struct CountingRunner {
        runs: Mutex<Vec<JobId>>,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self, job_id: &JobId) -> JobOutcome {
            self.runs.lock().unwrap().push(job_id.clone());
            JobOutcome::Completed
        }
    }

    /// How a scripted subscription attempt goes wrong.
    enum Breakage {
        SubscribeFails,
        ClosesImmediately,
        ErrorsImmediately,
    }

    /// A subscription that ends on its first read.
    struct EndingSubscription {
        error: bool,
    }

    #[async_trait]
    impl JobSubscription for EndingSubscription {
        async fn next(&mut self) -> DbResult<Option<JobId>> {
            if self.error {
                Err(DbError::Unavailable("listener connection reset".to_string()))
            } else {
                Ok(None)
            }
        }
    }

    /// Memory store whose first subscriptions break in scripted ways.
    struct FlakyRepo {
        inner: Arc<MemoryJobRepository>,
        breakages: Mutex<VecDeque<Breakage>>,
        subscribe_calls: AtomicU32,
    }

    impl FlakyRepo {
        fn new(inner: Arc<MemoryJobRepository>, breakages: Vec<Breakage>) -> Arc<Self> {
            Arc::new(Self {
                inner,
                breakages: Mutex::new(breakages.into()),
                subscribe_calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl JobRepository for FlakyRepo {
        async fn insert(&self, job: &Job) -> DbResult<()> {
            self.inner.insert(job).await
        }

        async fn get(&self, id: &JobId) -> DbResult<Option<Job>> {
            self.inner.get(id).await
        }

        async fn list_pending(&self, limit: usize) -> DbResult<Vec<Job>> {
            self.inner.list_pending(limit).await
        }

        async fn list_interrupted(&self) -> DbResult<Vec<Job>> {
            self.inner.list_interrupted().await
        }

        async fn update_status(&self, id: &JobId, status: JobStatus) -> DbResult<()> {
            self.inner.update_status(id, status).await
        }

        async fn set_script(&self, id: &JobId, script: &str) -> DbResult<()> {
            self.inner.set_script(id, script).await
        }

        async fn complete(&self, id: &JobId, artifacts: &ArtifactUrls) -> DbResult<()> {
            self.inner.complete(id, artifacts).await
        }

        async fn fail(&self, id: &JobId, error: &str) -> DbResult<()> {
            self.inner.fail(id, error).await
        }

        async fn subscribe_pending(&self) -> DbResult<Box<dyn JobSubscription>> {
            self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
            let next = self.breakages.lock().unwrap().pop_front();
            match next {
                Some(Breakage::SubscribeFails) => Err(DbError::Unavailable("LISTEN refused".to_string())),
                Some(Breakage::ClosesImmediately) => Ok(Box::new(EndingSubscription { error: false })),
                Some(Breakage::ErrorsImmediately) => Ok(Box::new(EndingSubscription { error: true })),
                None => self.inner.subscribe_pending().await,
            }
        }

        async fn ping(&self) -> DbResult<()> {
            self.inner.ping().await
        }
    }

    fn fast_push() -> PushSettings {
        PushSettings {
            backoff: Duration::from_millis(10),
            subscribe_timeout: Duration::from_secs(1),
        }
    }

    /// Run the push listener over `breakages` and check a later insert is still claimed.
    async fn assert_claims_after(breakages: Vec<Breakage>) -> u32 {
        let memory = Arc::new(MemoryJobRepository::new());
        let repo = FlakyRepo::new(memory.clone(), breakages);
        let runner = Arc::new(CountingRunner::default());
        let orch = Orchestrator::new(repo.clone(), runner.clone(), 2);

        let listener = tokio::spawn(run_push_listener(orch.clone(), fast_push()));

        while memory.subscriber_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let job = pending_job();
        repo.insert(&job).await.unwrap();

        while runner.runs.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        orch.wait_idle().await;
        assert_eq!(runner.runs.lock().unwrap().clone(), vec![job.id.clone()]);

        orch.shutdown();
        listener.await.unwrap();
        repo.subscribe_calls.load(Ordering::SeqCst)
    }

    fn pending_job() -> Job {
        Job::new("user-1", "Volcanoes", TargetDuration::Long, "en-US-AriaNeural", "ocean")
    }

    #[test]
    fn test_failure_tracker() {
        let mut tracker = FailureTracker::new(2);

        assert!(tracker.record_failure());
        assert!(tracker.record_failure());
        assert!(!tracker.record_failure());
        assert!(!tracker.record_failure());
        assert_eq!(tracker.failure_count(), 4);

        tracker.record_success();
        assert_eq!(tracker.failure_count(), 0);
        assert!(tracker.record_failure());
    }

    #[tokio::test]
    async fn test_push_insert_triggers_claim() {
        let repo = Arc::new(MemoryJobRepository::new());
        let runner = Arc::new(CountingRunner::default());
        let orch = Orchestrator::new(repo.clone(), runner.clone(), 2);

        let listener = tokio::spawn(run_push_listener(
            orch.clone(),
            PushSettings {
                backoff: Duration::from_millis(10),
                subscribe_timeout: Duration::from_secs(1),
            },
        ));

        while repo.subscriber_count() == 0 {
            tokio::task::yield_now().await;
        }

        let job = pending_job();
        repo.insert(&job).await.unwrap();

        while runner.runs.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        orch.wait_idle().await;
        assert_eq!(runner.runs.lock().unwrap().clone(), vec![job.id.clone()]);

        orch.shutdown();
        listener.await.unwrap();
    }

    #[tokio::test]
    async fn test_push_resubscribes_after_subscribe_errors() {
        let calls = assert_claims_after(vec![Breakage::SubscribeFails, Breakage::SubscribeFails]).await;
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_push_resubscribes_when_stream_ends() {
        let calls = assert_claims_after(vec![Breakage::ClosesImmediately, Breakage::ErrorsImmediately]).await;
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_claims_pending_and_stops_on_shutdown() {
        let repo = Arc::new(MemoryJobRepository::new());
        let job = pending_job();
        repo.seed(job.clone());

        let runner = Arc::new(CountingRunner::default());
        let orch = Orchestrator::new(repo, runner.clone(), 1);

        let poller = tokio::spawn(run_poller(orch.clone(), Duration::from_secs(15)));

        // First tick fires immediately
        while runner.runs.lock().unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        orch.wait_idle().await;

        orch.shutdown();
        poller.await.unwrap();
        assert_eq!(runner.runs.lock().unwrap().clone(), vec![job.id]);
    }
}
