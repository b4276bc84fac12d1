//! Worker error types and failure classification.

use reel_ai::AiError;
use reel_db::DbError;
use reel_media::MediaError;
use reel_models::ValidationError;
use reel_storage::StorageError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failure classes that decide retry behaviour and the stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed job input; never retried
    Validation,
    /// Script or speech service failure
    Upstream,
    /// Probe, transform or encode failure
    Media,
    /// Object storage failure after retries
    Storage,
    /// Job record write failure
    Persistence,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Media => "media",
            ErrorCategory::Storage => "storage",
            ErrorCategory::Persistence => "persistence",
            ErrorCategory::Internal => "internal",
        }
    }
}

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("Script generation failed: {0}")]
    Script(#[source] AiError),

    #[error("Voice generation failed: {0}")]
    Voice(#[source] AiError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] DbError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            WorkerError::Validation(_) => ErrorCategory::Validation,
            WorkerError::Script(_) | WorkerError::Voice(_) => ErrorCategory::Upstream,
            WorkerError::Media(_) => ErrorCategory::Media,
            WorkerError::Storage(_) => ErrorCategory::Storage,
            WorkerError::Persistence(_) => ErrorCategory::Persistence,
            WorkerError::ConfigError(_) | WorkerError::Io(_) | WorkerError::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Message safe to store on the job record.
    pub fn user_message(&self, max_len: usize) -> String {
        match self {
            WorkerError::Validation(e) => truncate(&e.to_string(), max_len),
            WorkerError::Script(_) => "Script generation failed".to_string(),
            WorkerError::Voice(_) => "Voice generation failed".to_string(),
            WorkerError::Media(
                e @ (MediaError::BackgroundNotFound { .. } | MediaError::TempoOutOfRange { .. }),
            ) => truncate(&e.to_string(), max_len),
            WorkerError::Media(_) => "Video rendering failed".to_string(),
            WorkerError::Storage(_) => "Cloud upload failed".to_string(),
            other => sanitize_message(&other.to_string(), max_len),
        }
    }
}

/// Known upstream substrings and the generic message that replaces them.
const KNOWN_FAILURES: &[(&str, &str)] = &[
    ("timed out", "Operation timed out"),
    ("timeout", "Operation timed out"),
    ("rate limit", "Service busy, please retry later"),
    ("429", "Service busy, please retry later"),
    ("ffmpeg", "Video rendering failed"),
    ("ffprobe", "Video rendering failed"),
    ("r2", "Cloud upload failed"),
    ("s3", "Cloud upload failed"),
    ("bucket", "Cloud upload failed"),
    ("upload", "Cloud upload failed"),
    ("speech", "Voice generation failed"),
    ("tts", "Voice generation failed"),
    ("completion", "Script generation failed"),
    ("database", "Internal storage error"),
    ("pool", "Internal storage error"),
    ("connection", "Internal storage error"),
];

/// Replace known upstream failures with a generic message, otherwise
/// truncate to `max_len` characters.
pub fn sanitize_message(raw: &str, max_len: usize) -> String {
    let lower = raw.to_lowercase();
    let known = KNOWN_FAILURES.iter().find(|(needle, _)| {
        lower
            .split(|c: char| !c.is_ascii_alphanumeric() && c != ' ')
            .any(|part| contains_token(part, needle))
    });
    match known {
        Some((_, message)) => message.to_string(),
        None => truncate(raw, max_len),
    }
}

/// Whole-word containment so "r2" does not match inside "ffr2x".
fn contains_token(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_len.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_messages() {
        let err = WorkerError::Storage(StorageError::upload("secret-bucket/key", "503"));
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert_eq!(err.user_message(200), "Cloud upload failed");

        let err = WorkerError::Script(AiError::ScriptExhausted {
            attempts: 6,
            last_error: "sk-live-123 rejected".into(),
        });
        assert_eq!(err.category(), ErrorCategory::Upstream);
        assert_eq!(err.user_message(200), "Script generation failed");

        let err = WorkerError::Media(MediaError::ffmpeg_failed("boom", None, Some(1)));
        assert_eq!(err.user_message(200), "Video rendering failed");
    }

    #[test]
    fn test_validation_message_kept() {
        let err = WorkerError::Validation(ValidationError::InvalidDuration(45));
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.user_message(200).contains("45"));
    }

    #[test]
    fn test_missing_background_is_reported() {
        let err = WorkerError::Media(MediaError::BackgroundNotFound {
            category: "lava".into(),
            duration: 30,
        });
        assert!(err.user_message(200).contains("lava"));
    }

    #[test]
    fn test_sanitize_known_substrings() {
        assert_eq!(
            sanitize_message("Persistence error: pool timed out while waiting", 200),
            "Operation timed out"
        );
        assert_eq!(
            sanitize_message("error talking to R2 endpoint", 200),
            "Cloud upload failed"
        );
    }

    #[test]
    fn test_sanitize_truncates_unknown() {
        let raw = "x".repeat(500);
        let msg = sanitize_message(&raw, 200);
        assert_eq!(msg.chars().count(), 200);
        assert!(msg.ends_with("..."));
        assert_eq!(sanitize_message("plain failure", 200), "plain failure");
    }

    #[test]
    fn test_token_match_is_whole_word() {
        assert!(contains_token("the r2 store", "r2"));
        assert!(!contains_token("vr2x", "r2"));
        assert!(!contains_token("topools", "pool"));
    }
}
