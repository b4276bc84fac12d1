//! AI client error types.

use thiserror::Error;

/// Result type for script and voice synthesis.
pub type AiResult<T> = Result<T, AiError>;

/// Errors from the script and speech services.
#[derive(Debug, Error)]
pub enum AiError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Empty completion from {0}")]
    EmptyCompletion(String),

    #[error("Script generation exhausted after {attempts} attempts: {last_error}")]
    ScriptExhausted { attempts: u32, last_error: String },

    #[error("Speech synthesis failed: {0}")]
    SpeechFailed(String),

    #[error("Unrecognized timestamp payload: {0}")]
    TimestampFormat(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn speech_failed(msg: impl Into<String>) -> Self {
        Self::SpeechFailed(msg.into())
    }

    pub fn timestamp_format(msg: impl Into<String>) -> Self {
        Self::TimestampFormat(msg.into())
    }

    /// Truncated upstream error body.
    pub fn upstream(status: u16, body: &str) -> Self {
        Self::UpstreamStatus {
            status,
            body: body.chars().take(300).collect(),
        }
    }
}
