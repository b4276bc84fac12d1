//! Errors from the object store and the artifact publisher.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not set")]
    MissingSetting(&'static str),

    #[error("Upload of {key} failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("Signing a URL for {key} failed: {reason}")]
    Sign { key: String, reason: String },

    #[error("Bucket unreachable: {0}")]
    Unreachable(String),
}

impl StorageError {
    pub fn upload(key: &str, reason: impl ToString) -> Self {
        Self::Upload {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn sign(key: &str, reason: impl ToString) -> Self {
        Self::Sign {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_key() {
        let err = StorageError::upload("jobs/a/video.mp4", "503 Slow Down");
        assert_eq!(err.to_string(), "Upload of jobs/a/video.mp4 failed: 503 Slow Down");
        assert_eq!(
            StorageError::MissingSetting("R2_BUCKET_NAME").to_string(),
            "R2_BUCKET_NAME not set"
        );
    }
}
