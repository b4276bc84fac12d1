//! Job record store.
//!
//! This crate provides:
//! - The [`JobRepository`] contract used by the worker and the API
//! - A PostgreSQL implementation with LISTEN/NOTIFY push subscription
//! - An in-memory implementation with status history for tests
//! - Guarded terminal writes and query metrics

pub mod error;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod repository;

pub use error::{DbError, DbResult};
pub use memory::MemoryJobRepository;
pub use postgres::{connect, DbConfig, PgJobRepository, PENDING_CHANNEL};
pub use repository::{JobRepository, JobSubscription};
