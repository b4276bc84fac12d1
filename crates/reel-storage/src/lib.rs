//! Cloudflare R2 storage client and artifact publisher.
//!
//! Provides:
//! - An S3-compatible client for R2 behind the [`ObjectStore`] trait
//! - The `jobs/{jobId}/...` artifact key layout
//! - Upload retry with exponential backoff
//! - Concurrent artifact publishing with signed URLs

pub mod client;
pub mod error;
pub mod keys;
pub mod publisher;
pub mod retry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ObjectStore, R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use keys::{artifact_key, ArtifactKind};
pub use publisher::{ArtifactPublisher, LocalArtifacts, PublisherConfig};
pub use retry::{retry_async, RetryConfig, RetryResult};
