//! Job input value types and validation.
//!
//! Every job input is checked here before any pipeline stage runs. The API
//! uses the same rules when accepting a request, and the worker re-checks the
//! persisted row since it cannot trust rows written by other producers.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum topic length in characters (before sanitization).
pub const MAX_TOPIC_LENGTH: usize = 500;

/// Maximum background category length.
pub const MAX_CATEGORY_LENGTH: usize = 64;

/// Voices the speech service is allowed to use.
pub const SUPPORTED_VOICES: &[&str] = &[
    "en-US-GuyNeural",
    "en-US-JennyNeural",
    "en-US-AriaNeural",
    "en-US-DavisNeural",
    "en-US-ChristopherNeural",
    "en-GB-RyanNeural",
    "en-GB-SoniaNeural",
    "en-AU-NatashaNeural",
];

static MARKUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid markup regex"));

static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9-]+$").expect("valid category regex"));

/// Input validation failures. Messages are safe to show to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Topic is required")]
    EmptyTopic,

    #[error("Topic exceeds {MAX_TOPIC_LENGTH} characters")]
    TopicTooLong,

    #[error("Unsupported duration: {0}s (expected 30 or 60)")]
    InvalidDuration(u32),

    #[error("Unsupported voice: {0}")]
    InvalidVoice(String),

    #[error("Invalid background category: {0}")]
    InvalidBackground(String),
}

/// Strip markup and control characters from a topic and collapse whitespace.
pub fn sanitize_topic(raw: &str) -> String {
    let without_markup = MARKUP_RE.replace_all(raw, " ");
    let cleaned: String = without_markup
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check the raw topic length and return the sanitized topic.
pub fn validate_topic(raw: &str) -> Result<String, ValidationError> {
    if raw.chars().count() > MAX_TOPIC_LENGTH {
        return Err(ValidationError::TopicTooLong);
    }
    let topic = sanitize_topic(raw);
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    Ok(topic)
}

/// Target length of the finished video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TargetDuration {
    /// 30 seconds
    Short,
    /// 60 seconds
    Long,
}

impl TargetDuration {
    pub fn as_secs(&self) -> u32 {
        match self {
            TargetDuration::Short => 30,
            TargetDuration::Long => 60,
        }
    }

    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.as_secs())
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.as_secs()))
    }
}

// Serialized as plain seconds
impl JsonSchema for TargetDuration {
    fn schema_name() -> String {
        "TargetDuration".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        u32::json_schema(gen)
    }
}

impl TryFrom<u32> for TargetDuration {
    type Error = ValidationError;

    fn try_from(secs: u32) -> Result<Self, Self::Error> {
        match secs {
            30 => Ok(TargetDuration::Short),
            60 => Ok(TargetDuration::Long),
            other => Err(ValidationError::InvalidDuration(other)),
        }
    }
}

impl From<TargetDuration> for u32 {
    fn from(d: TargetDuration) -> Self {
        d.as_secs()
    }
}

impl fmt::Display for TargetDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_secs())
    }
}

/// A voice identifier from [`SUPPORTED_VOICES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct Voice(String);

impl Voice {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if SUPPORTED_VOICES.contains(&s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidVoice(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A background catalog category: lowercase alphanumerics and hyphens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct BackgroundCategory(String);

impl BackgroundCategory {
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if s.len() <= MAX_CATEGORY_LENGTH && CATEGORY_RE.is_match(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ValidationError::InvalidBackground(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BackgroundCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
