//! Structured job logging.
//!
//! Every line carries the job id and the current stage so a single job can
//! be followed through the pipeline.

use reel_models::{JobId, JobStatus};
use tracing::{error, info, warn, Span};

use crate::error::WorkerError;

/// Logger bound to one job run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: JobStatus) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            stage = stage.as_str(),
            "Job stage: {}", stage
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log a stage failure with its category.
    pub fn log_error(&self, err: &WorkerError) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            category = err.category().as_str(),
            "Job error: {}", err
        );
    }

    /// Log a failed job record write. These can leave a job stuck.
    pub fn log_persistence_error(&self, action: &str, err: &dyn std::fmt::Display) {
        error!(
            job_id = %self.job_id,
            operation = %self.operation,
            persistence = true,
            "Job record write failed ({}): {}", action, err
        );
    }

    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Span wrapping one pipeline run.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "reel_pipeline");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.operation(), "reel_pipeline");
    }
}
