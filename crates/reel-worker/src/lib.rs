//! Short-video job worker.
//!
//! This crate provides:
//! - The stage pipeline: script, voice, duration fit, captions, composition, upload
//! - A job orchestrator with a bounded in-flight set and crash recovery
//! - Job discovery by periodic sweep and push notification
//! - Failure classification and message sanitization
//! - Graceful shutdown

pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod workspace;

pub use config::WorkerConfig;
pub use error::{ErrorCategory, WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use orchestrator::{ClaimOutcome, Orchestrator};
pub use pipeline::{JobOutcome, JobRunner, Pipeline, PipelineComponents, PipelineSettings};
pub use workspace::JobWorkspace;
