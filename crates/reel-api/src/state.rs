//! Application state.

use std::sync::Arc;

use reel_db::{JobRepository, PgJobRepository};
use reel_storage::{ArtifactPublisher, ObjectStore, PublisherConfig, R2Client};

use crate::auth::JwtVerifier;
use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: Arc<dyn JobRepository>,
    pub storage: Arc<dyn ObjectStore>,
    pub publisher: ArtifactPublisher,
    pub auth: Arc<JwtVerifier>,
}

impl AppState {
    /// Create application state backed by PostgreSQL and R2.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        if config.jwt_secret.is_empty() {
            return Err("JWT_SECRET must be set".into());
        }

        let jobs: Arc<dyn JobRepository> = Arc::new(PgJobRepository::from_env().await?);
        let storage: Arc<dyn ObjectStore> = Arc::new(R2Client::from_env().await?);

        Ok(Self::from_parts(config, jobs, storage, PublisherConfig::from_env()))
    }

    /// Assemble state from already constructed collaborators.
    pub fn from_parts(
        config: ApiConfig,
        jobs: Arc<dyn JobRepository>,
        storage: Arc<dyn ObjectStore>,
        publisher: PublisherConfig,
    ) -> Self {
        let auth = Arc::new(JwtVerifier::new(&config.jwt_secret, config.jwt_audience.as_deref()));
        Self {
            publisher: ArtifactPublisher::new(Arc::clone(&storage), publisher),
            config,
            jobs,
            storage,
            auth,
        }
    }
}
