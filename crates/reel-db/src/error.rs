//! Job store error types.

use reel_models::{JobId, JobStatus};
use thiserror::Error;

/// Result type for job store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors that can occur while reading or writing job records.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job {id} is terminal; refusing transition to {to}")]
    InvalidTransition { id: JobId, to: JobStatus },

    #[error("Corrupt job row {id}: {message}")]
    CorruptRow { id: String, message: String },

    #[error("Subscription error: {0}")]
    Subscription(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl DbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn subscription(msg: impl Into<String>) -> Self {
        Self::Subscription(msg.into())
    }

    /// True when a guarded write found the row already terminal.
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DbError::InvalidTransition { .. })
    }
}
