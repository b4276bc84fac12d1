//! Job record and identifiers.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::status::JobStatus;
use crate::validation::{validate_topic, BackgroundCategory, TargetDuration, ValidationError, Voice};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed URLs of the three published artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactUrls {
    pub audio: String,
    pub subtitles: String,
    pub video: String,
}

/// A persisted video generation job.
///
/// Inputs are stored raw so that a row written by any producer can be
/// re-validated by the worker; see [`Job::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user ID
    pub user_id: String,

    /// Topic text as submitted
    pub topic: String,

    /// Target duration in seconds
    pub duration_secs: u32,

    /// Requested voice identifier
    pub voice: String,

    /// Requested background category
    pub background: String,

    /// Pipeline status
    #[serde(default)]
    pub status: JobStatus,

    /// Generated script, reused across retries once set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Sanitized failure message (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Validated, typed job inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// Sanitized topic
    pub topic: String,
    pub duration: TargetDuration,
    pub voice: Voice,
    pub background: BackgroundCategory,
}

impl Job {
    /// Create a new pending job.
    pub fn new(
        user_id: impl Into<String>,
        topic: impl Into<String>,
        duration: TargetDuration,
        voice: impl Into<String>,
        background: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            topic: topic.into(),
            duration_secs: duration.as_secs(),
            voice: voice.into(),
            background: background.into(),
            status: JobStatus::Pending,
            script: None,
            audio_url: None,
            subtitles_url: None,
            video_url: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check every input and return the typed spec.
    pub fn validate(&self) -> Result<JobSpec, ValidationError> {
        Ok(JobSpec {
            topic: validate_topic(&self.topic)?,
            duration: TargetDuration::try_from(self.duration_secs)?,
            voice: Voice::parse(&self.voice)?,
            background: BackgroundCategory::parse(&self.background)?,
        })
    }

    /// Artifact URLs, present only when all three are set.
    pub fn artifacts(&self) -> Option<ArtifactUrls> {
        match (&self.audio_url, &self.subtitles_url, &self.video_url) {
            (Some(audio), Some(subtitles), Some(video)) => Some(ArtifactUrls {
                audio: audio.clone(),
                subtitles: subtitles.clone(),
                video: video.clone(),
            }),
            _ => None,
        }
    }

    /// Script text if it has already been generated.
    pub fn existing_script(&self) -> Option<&str> {
        self.script.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Job {
        Job::new(
            "user-1",
            "The <i>history</i> of coffee",
            TargetDuration::Short,
            "en-US-AriaNeural",
            "minecraft",
        )
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = sample();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.duration_secs, 30);
        assert!(job.artifacts().is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_validate_returns_sanitized_spec() {
        let spec = sample().validate().unwrap();
        assert_eq!(spec.topic, "The history of coffee");
        assert_eq!(spec.duration, TargetDuration::Short);
        assert_eq!(spec.voice.as_str(), "en-US-AriaNeural");
        assert_eq!(spec.background.as_str(), "minecraft");
    }

    #[test]
    fn test_validate_rejects_bad_inputs() {
        let mut job = sample();
        job.duration_secs = 45;
        assert_eq!(job.validate(), Err(ValidationError::InvalidDuration(45)));

        let mut job = sample();
        job.voice = "robot".into();
        assert!(matches!(job.validate(), Err(ValidationError::InvalidVoice(_))));

        let mut job = sample();
        job.background = "Not Valid".into();
        assert!(matches!(
            job.validate(),
            Err(ValidationError::InvalidBackground(_))
        ));
    }

    #[test]
    fn test_artifacts_require_all_three() {
        let mut job = sample();
        job.audio_url = Some("a".into());
        job.video_url = Some("v".into());
        assert!(job.artifacts().is_none());

        job.subtitles_url = Some("s".into());
        let artifacts = job.artifacts().unwrap();
        assert_eq!(artifacts.subtitles, "s");
    }

    #[test]
    fn test_existing_script_ignores_blank() {
        let mut job = sample();
        job.script = Some("   ".into());
        assert!(job.existing_script().is_none());
        job.script = Some("Hello there.".into());
        assert_eq!(job.existing_script(), Some("Hello there."));
    }
}
