//! Job store contract shared by the worker and the API.

use async_trait::async_trait;
use reel_models::{ArtifactUrls, Job, JobId, JobStatus};

use crate::error::DbResult;

/// Stream of ids of newly inserted `pending` jobs.
///
/// Delivery is best-effort; callers must not rely on seeing every insert.
#[async_trait]
pub trait JobSubscription: Send {
    /// Wait for the next notification. `Ok(None)` means the channel closed.
    async fn next(&mut self) -> DbResult<Option<JobId>>;
}

/// Persistent job record store.
///
/// Status, completion and failure writes are guarded: a row that is already
/// `completed` or `failed` is never modified and the write returns
/// [`DbError::InvalidTransition`](crate::DbError::InvalidTransition).
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &Job) -> DbResult<()>;

    async fn get(&self, id: &JobId) -> DbResult<Option<Job>>;

    /// Up to `limit` pending jobs, oldest first.
    async fn list_pending(&self, limit: usize) -> DbResult<Vec<Job>>;

    /// Jobs left mid-pipeline (neither pending nor terminal), oldest first.
    async fn list_interrupted(&self) -> DbResult<Vec<Job>>;

    async fn update_status(&self, id: &JobId, status: JobStatus) -> DbResult<()>;

    async fn set_script(&self, id: &JobId, script: &str) -> DbResult<()>;

    /// Mark completed and store all three artifact URLs in one write.
    async fn complete(&self, id: &JobId, artifacts: &ArtifactUrls) -> DbResult<()>;

    /// Mark failed with a user-visible message.
    async fn fail(&self, id: &JobId, error: &str) -> DbResult<()>;

    /// Subscribe to pending-job insert notifications.
    async fn subscribe_pending(&self) -> DbResult<Box<dyn JobSubscription>>;

    /// Connectivity check for readiness probes.
    async fn ping(&self) -> DbResult<()>;
}
