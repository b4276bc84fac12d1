//! Axum HTTP API server.
//!
//! This crate provides:
//! - Job submission and lookup for authenticated users
//! - Signed artifact URLs for owners and for completed (public) jobs
//! - HS256 bearer token verification
//! - Rate limiting and security headers
//! - Prometheus metrics

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, JwtVerifier, MaybeAuthUser};
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
