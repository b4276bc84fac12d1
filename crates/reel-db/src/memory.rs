//! In-memory job store.
//!
//! Same contract as the PostgreSQL store. Also records every status each job
//! has held, which the worker's tests use to check transition order.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use reel_models::{ArtifactUrls, Job, JobId, JobStatus};
use tokio::sync::broadcast;

use crate::error::{DbError, DbResult};
use crate::repository::{JobRepository, JobSubscription};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    history: HashMap<JobId, Vec<JobStatus>>,
    fail_writes: bool,
}

pub struct MemoryJobRepository {
    state: Mutex<State>,
    notify: broadcast::Sender<JobId>,
}

impl Default for MemoryJobRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State::default()),
            notify,
        }
    }

    fn lock(&self) -> DbResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DbError::Unavailable("memory store lock poisoned".to_string()))
    }

    /// Make every subsequent write fail, simulating a lost database.
    pub fn set_fail_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_writes = fail;
        }
    }

    /// Every status the job has held, in order.
    pub fn status_history(&self, id: &JobId) -> Vec<JobStatus> {
        self.state
            .lock()
            .map(|s| s.history.get(id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Number of open pending-job subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.notify.receiver_count()
    }

    /// Insert a row as-is without notifying subscribers.
    pub fn seed(&self, job: Job) {
        if let Ok(mut state) = self.state.lock() {
            state.history.insert(job.id.clone(), vec![job.status]);
            state.jobs.insert(job.id.clone(), job);
        }
    }

    fn mutate<F>(&self, id: &JobId, to: JobStatus, guarded: bool, apply: F) -> DbResult<()>
    where
        F: FnOnce(&mut Job),
    {
        let mut state = self.lock()?;
        if state.fail_writes {
            return Err(DbError::Unavailable("simulated write failure".to_string()));
        }
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| DbError::NotFound(id.clone()))?;
        if guarded && job.status.is_terminal() {
            return Err(DbError::InvalidTransition { id: id.clone(), to });
        }

        let before = job.status;
        apply(job);
        job.updated_at = Utc::now();
        let after = job.status;

        if after != before {
            state.history.entry(id.clone()).or_default().push(after);
        }
        Ok(())
    }

    fn sorted(mut jobs: Vec<Job>) -> Vec<Job> {
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        {
            let mut state = self.lock()?;
            if state.fail_writes {
                return Err(DbError::Unavailable("simulated write failure".to_string()));
            }
            if state.jobs.contains_key(&job.id) {
                return Err(DbError::AlreadyExists(job.id.clone()));
            }
            state.history.insert(job.id.clone(), vec![job.status]);
            state.jobs.insert(job.id.clone(), job.clone());
        }

        if job.status == JobStatus::Pending {
            // No receivers is fine
            let _ = self.notify.send(job.id.clone());
        }
        Ok(())
    }

    async fn get(&self, id: &JobId) -> DbResult<Option<Job>> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    async fn list_pending(&self, limit: usize) -> DbResult<Vec<Job>> {
        let state = self.lock()?;
        let pending = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        Ok(Self::sorted(pending).into_iter().take(limit).collect())
    }

    async fn list_interrupted(&self) -> DbResult<Vec<Job>> {
        let state = self.lock()?;
        let interrupted = state
            .jobs
            .values()
            .filter(|j| j.status.is_recoverable())
            .cloned()
            .collect();
        Ok(Self::sorted(interrupted))
    }

    async fn update_status(&self, id: &JobId, status: JobStatus) -> DbResult<()> {
        self.mutate(id, status, true, |job| job.status = status)
    }

    async fn set_script(&self, id: &JobId, script: &str) -> DbResult<()> {
        let status = self.lock()?.jobs.get(id).map(|j| j.status).unwrap_or_default();
        self.mutate(id, status, false, |job| job.script = Some(script.to_string()))
    }

    async fn complete(&self, id: &JobId, artifacts: &ArtifactUrls) -> DbResult<()> {
        self.mutate(id, JobStatus::Completed, true, |job| {
            job.status = JobStatus::Completed;
            job.audio_url = Some(artifacts.audio.clone());
            job.subtitles_url = Some(artifacts.subtitles.clone());
            job.video_url = Some(artifacts.video.clone());
            job.error = None;
        })
    }

    async fn fail(&self, id: &JobId, error: &str) -> DbResult<()> {
        self.mutate(id, JobStatus::Failed, true, |job| {
            job.status = JobStatus::Failed;
            job.error = Some(error.to_string());
        })
    }

    async fn subscribe_pending(&self) -> DbResult<Box<dyn JobSubscription>> {
        Ok(Box::new(MemorySubscription {
            receiver: self.notify.subscribe(),
        }))
    }

    async fn ping(&self) -> DbResult<()> {
        let state = self.lock()?;
        if state.fail_writes {
            return Err(DbError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

struct MemorySubscription {
    receiver: broadcast::Receiver<JobId>,
}

#[async_trait]
impl JobSubscription for MemorySubscription {
    async fn next(&mut self) -> DbResult<Option<JobId>> {
        loop {
            match self.receiver.recv().await {
                Ok(id) => return Ok(Some(id)),
                // Missed ids are left for the periodic sweep
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
