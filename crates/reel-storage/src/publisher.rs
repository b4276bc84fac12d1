//! Artifact publishing: upload a job's audio, subtitles and video, then sign
//! access URLs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use reel_models::{ArtifactUrls, JobId};
use tracing::info;

use crate::client::ObjectStore;
use crate::error::{StorageError, StorageResult};
use crate::keys::{artifact_key, ArtifactKind};
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Publisher settings.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Upload attempts per artifact
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards
    pub base_delay: Duration,
    /// Lifetime of issued signed URLs
    pub url_ttl: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            url_ttl: Duration::from_secs(3600),
        }
    }
}

impl PublisherConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_attempts: std::env::var("UPLOAD_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            base_delay: Duration::from_millis(
                std::env::var("UPLOAD_RETRY_BASE_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1000),
            ),
            url_ttl: Duration::from_secs(
                std::env::var("SIGNED_URL_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(3600),
            ),
        }
    }
}

/// Local files produced by one pipeline run.
#[derive(Debug, Clone)]
pub struct LocalArtifacts {
    pub audio: PathBuf,
    pub subtitles: PathBuf,
    pub video: PathBuf,
}

/// Uploads artifacts with retry and issues signed URLs.
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    config: PublisherConfig,
}

impl ArtifactPublisher {
    pub fn new(store: Arc<dyn ObjectStore>, config: PublisherConfig) -> Self {
        Self { store, config }
    }

    pub fn url_ttl(&self) -> Duration {
        self.config.url_ttl
    }

    /// Upload all three artifacts concurrently.
    ///
    /// Fails as soon as any artifact exhausts its attempts; the error carries
    /// that artifact's last underlying cause.
    pub async fn publish(&self, job_id: &JobId, local: &LocalArtifacts) -> StorageResult<ArtifactUrls> {
        let (audio, subtitles, video) = futures::try_join!(
            self.publish_one(job_id, ArtifactKind::Audio, &local.audio),
            self.publish_one(job_id, ArtifactKind::Subtitles, &local.subtitles),
            self.publish_one(job_id, ArtifactKind::Video, &local.video),
        )?;

        info!(job_id = %job_id, "Published artifacts");
        Ok(ArtifactUrls {
            audio,
            subtitles,
            video,
        })
    }

    /// Upload one file and return its signed URL.
    pub async fn publish_one(
        &self,
        job_id: &JobId,
        kind: ArtifactKind,
        path: &Path,
    ) -> StorageResult<String> {
        let key = artifact_key(job_id, kind);
        let retry = RetryConfig::new(format!("upload {}", key))
            .with_max_attempts(self.config.max_attempts)
            .with_base_delay(self.config.base_delay);

        let outcome = retry_async(&retry, || {
            self.store.upload_file(path, &key, kind.content_type())
        })
        .await;

        if let RetryResult::Failed { error, attempts } = outcome {
            return Err(StorageError::upload(
                &key,
                format!("gave up after {} attempts: {}", attempts, error),
            ));
        }

        self.store.presign_get(&key, self.config.url_ttl).await
    }

    /// Re-derive a signed URL for an already published artifact.
    pub async fn signed_url(&self, job_id: &JobId, kind: ArtifactKind) -> StorageResult<String> {
        self.store
            .presign_get(&artifact_key(job_id, kind), self.config.url_ttl)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryObjectStore;

    fn local() -> LocalArtifacts {
        LocalArtifacts {
            audio: PathBuf::from("/work/j/voice_fitted.mp3"),
            subtitles: PathBuf::from("/work/j/subtitles.ass"),
            video: PathBuf::from("/work/j/video.mp4"),
        }
    }

    fn fast_config() -> PublisherConfig {
        PublisherConfig {
            base_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_uploads_all_three() {
        let store = Arc::new(MemoryObjectStore::new());
        let publisher = ArtifactPublisher::new(store.clone(), fast_config());
        let job_id = JobId::from_string("j");

        let urls = publisher.publish(&job_id, &local()).await.unwrap();

        assert!(urls.audio.contains("jobs/j/audio.mp3"));
        assert!(urls.subtitles.contains("jobs/j/subtitles.ass"));
        assert!(urls.video.contains("jobs/j/video.mp4"));
        assert!(urls.video.contains("expires=3600"));

        let mut keys = store.uploaded_keys();
        keys.sort();
        assert_eq!(keys, vec!["jobs/j/audio.mp3", "jobs/j/subtitles.ass", "jobs/j/video.mp4"]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next("jobs/j/video.mp4", 2);
        let publisher = ArtifactPublisher::new(store.clone(), fast_config());

        publisher.publish(&JobId::from_string("j"), &local()).await.unwrap();
        assert_eq!(store.attempts("jobs/j/video.mp4"), 3);
        assert_eq!(store.attempts("jobs/j/audio.mp3"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_with_last_cause() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next("jobs/j/subtitles.ass", 10);
        let publisher = ArtifactPublisher::new(store.clone(), fast_config());

        let err = publisher
            .publish(&JobId::from_string("j"), &local())
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.starts_with("Upload of jobs/j/subtitles.ass failed"), "{msg}");
        assert!(msg.contains("after 3 attempts"), "{msg}");
        assert!(msg.contains("simulated upload failure"), "{msg}");
        assert_eq!(store.attempts("jobs/j/subtitles.ass"), 3);
    }

    #[tokio::test]
    async fn test_signed_url_rederived() {
        let store = Arc::new(MemoryObjectStore::new());
        let publisher = ArtifactPublisher::new(store, fast_config());
        let url = publisher
            .signed_url(&JobId::from_string("k"), ArtifactKind::Subtitles)
            .await
            .unwrap();
        assert!(url.contains("jobs/k/subtitles.ass"));
    }
}
