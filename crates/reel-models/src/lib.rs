//! Shared data models for the ReelForge backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job ids and the pipeline status state machine
//! - Job inputs (target duration, voice, background category) and their validation
//! - Word-level speech timings
//! - API request/response schemas

pub mod job;
pub mod request;
pub mod status;
pub mod timing;
pub mod validation;

// Re-export common types
pub use job::{ArtifactUrls, Job, JobId, JobSpec};
pub use request::{CreateJobRequest, JobResponse};
pub use status::JobStatus;
pub use timing::WordTiming;
pub use validation::{
    sanitize_topic, validate_topic, BackgroundCategory, TargetDuration, ValidationError, Voice, MAX_TOPIC_LENGTH,
    SUPPORTED_VOICES,
};
