//! API request/response schemas.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::job::{ArtifactUrls, Job, JobId};
use crate::status::JobStatus;
use crate::validation::{BackgroundCategory, TargetDuration, Voice};

/// Request body for creating a job.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, JsonSchema)]
pub struct CreateJobRequest {
    #[validate(length(min = 1, max = 500))]
    pub topic: String,

    /// 30 or 60
    pub duration: u32,

    #[validate(custom(function = "validate_voice"))]
    pub voice: String,

    #[validate(custom(function = "validate_background"))]
    pub background: String,
}

fn validate_voice(voice: &str) -> Result<(), validator::ValidationError> {
    Voice::parse(voice)
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("unsupported_voice"))
}

fn validate_background(background: &str) -> Result<(), validator::ValidationError> {
    BackgroundCategory::parse(background)
        .map(|_| ())
        .map_err(|_| validator::ValidationError::new("invalid_background"))
}

impl CreateJobRequest {
    /// Build a pending job for `user_id`.
    ///
    /// Callers run [`Validate::validate`] first; the duration is checked here
    /// because it is not a string field.
    pub fn into_job(self, user_id: &str) -> Result<Job, crate::ValidationError> {
        let duration = TargetDuration::try_from(self.duration)?;
        let job = Job::new(user_id, self.topic, duration, self.voice, self.background);
        job.validate()?;
        Ok(job)
    }
}

/// Outward view of a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResponse {
    pub id: JobId,
    pub status: JobStatus,
    pub topic: String,
    pub duration: u32,
    pub voice: String,
    pub background: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<ArtifactUrls>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            status: job.status,
            topic: job.topic.clone(),
            duration: job.duration_secs,
            voice: job.voice.clone(),
            background: job.background.clone(),
            script: job.script.clone(),
            artifacts: job.artifacts(),
            error: job.error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateJobRequest {
        CreateJobRequest {
            topic: "Why cats purr".into(),
            duration: 60,
            voice: "en-GB-RyanNeural".into(),
            background: "parkour".into(),
        }
    }

    #[test]
    fn test_valid_request() {
        let req = request();
        assert!(req.validate().is_ok());
        let job = req.into_job("user-9").unwrap();
        assert_eq!(job.user_id, "user-9");
        assert_eq!(job.duration_secs, 60);
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_invalid_fields_reported() {
        let mut req = request();
        req.voice = "nope".into();
        req.background = "UPPER".into();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("voice"));
        assert!(fields.contains_key("background"));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let mut req = request();
        req.duration = 15;
        assert!(req.into_job("user-9").is_err());
    }
}
