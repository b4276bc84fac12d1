//! PostgreSQL job store.

use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reel_models::{ArtifactUrls, Job, JobId, JobStatus};
use sqlx::postgres::{PgConnectOptions, PgListener, PgPoolOptions};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::metrics::{record_query, record_subscription};
use crate::repository::{JobRepository, JobSubscription};

/// Channel the insert trigger notifies on.
pub const PENDING_CHANNEL: &str = "reel_jobs_pending";

const JOB_COLUMNS: &str = "id, user_id, topic, duration_secs, voice, background, status, \
     script, audio_url, subtitles_url, video_url, error, created_at, updated_at";

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DbConfig {
    /// Create config from environment variables.
    pub fn from_env() -> DbResult<Self> {
        Ok(Self {
            url: std::env::var("DATABASE_URL")
                .map_err(|_| DbError::config_error("DATABASE_URL not set"))?,
            max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            acquire_timeout: Duration::from_secs(
                std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }
}

/// Open a pool and run pending migrations.
pub async fn connect(config: &DbConfig) -> DbResult<PgPool> {
    let options = PgConnectOptions::from_str(&config.url)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Connected to PostgreSQL");
    Ok(pool)
}

#[derive(Debug, FromRow)]
struct JobRow {
    id: String,
    user_id: String,
    topic: String,
    duration_secs: i32,
    voice: String,
    background: String,
    status: String,
    script: Option<String>,
    audio_url: Option<String>,
    subtitles_url: Option<String>,
    video_url: Option<String>,
    error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = DbError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = JobStatus::from_str(&row.status).map_err(|e| DbError::CorruptRow {
            id: row.id.clone(),
            message: e.to_string(),
        })?;
        let duration_secs = u32::try_from(row.duration_secs).map_err(|_| DbError::CorruptRow {
            id: row.id.clone(),
            message: format!("negative duration {}", row.duration_secs),
        })?;

        Ok(Job {
            id: JobId::from_string(row.id),
            user_id: row.user_id,
            topic: row.topic,
            duration_secs,
            voice: row.voice,
            background: row.background,
            status,
            script: row.script,
            audio_url: row.audio_url,
            subtitles_url: row.subtitles_url,
            video_url: row.video_url,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Job store backed by a `jobs` table.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn from_env() -> DbResult<Self> {
        let config = DbConfig::from_env()?;
        Ok(Self::new(connect(&config).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_jobs(&self, operation: &'static str, sql: &str, limit: Option<i64>) -> DbResult<Vec<Job>> {
        let start = Instant::now();
        let mut query = sqlx::query_as::<_, JobRow>(sql);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let result = query.fetch_all(&self.pool).await;
        record_query(operation, result.is_ok(), start.elapsed().as_secs_f64());

        result?.into_iter().map(Job::try_from).collect()
    }

    /// Run a guarded update; zero affected rows means the job is terminal
    /// or missing.
    async fn guarded_update(
        &self,
        operation: &'static str,
        id: &JobId,
        to: JobStatus,
        query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> DbResult<()> {
        let start = Instant::now();
        let result = query.execute(&self.pool).await;
        record_query(operation, result.is_ok(), start.elapsed().as_secs_f64());

        if result?.rows_affected() == 0 {
            return match self.get(id).await? {
                Some(_) => Err(DbError::InvalidTransition { id: id.clone(), to }),
                None => Err(DbError::NotFound(id.clone())),
            };
        }
        debug!(job_id = %id, status = %to, "Job updated");
        Ok(())
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &Job) -> DbResult<()> {
        let start = Instant::now();
        let result = sqlx::query(
            "INSERT INTO jobs (id, user_id, topic, duration_secs, voice, background, status, \
             script, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(job.id.as_str())
        .bind(&job.user_id)
        .bind(&job.topic)
        .bind(job.duration_secs as i32)
        .bind(&job.voice)
        .bind(&job.background)
        .bind(job.status.as_str())
        .bind(job.script.as_deref())
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await;
        record_query("insert", result.is_ok(), start.elapsed().as_secs_f64());

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(DbError::AlreadyExists(job.id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: &JobId) -> DbResult<Option<Job>> {
        let start = Instant::now();
        let sql = format!("SELECT {} FROM jobs WHERE id = $1", JOB_COLUMNS);
        let result = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await;
        record_query("get", result.is_ok(), start.elapsed().as_secs_f64());

        result?.map(Job::try_from).transpose()
    }

    async fn list_pending(&self, limit: usize) -> DbResult<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1",
            JOB_COLUMNS
        );
        self.fetch_jobs("list_pending", &sql, Some(limit as i64)).await
    }

    async fn list_interrupted(&self) -> DbResult<Vec<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status NOT IN ('pending', 'completed', 'failed') \
             ORDER BY created_at ASC",
            JOB_COLUMNS
        );
        self.fetch_jobs("list_interrupted", &sql, None).await
    }

    async fn update_status(&self, id: &JobId, status: JobStatus) -> DbResult<()> {
        let query = sqlx::query(
            "UPDATE jobs SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id.as_str())
        .bind(status.as_str());
        self.guarded_update("update_status", id, status, query).await
    }

    async fn set_script(&self, id: &JobId, script: &str) -> DbResult<()> {
        let start = Instant::now();
        let result = sqlx::query("UPDATE jobs SET script = $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_str())
            .bind(script)
            .execute(&self.pool)
            .await;
        record_query("set_script", result.is_ok(), start.elapsed().as_secs_f64());

        if result?.rows_affected() == 0 {
            return Err(DbError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn complete(&self, id: &JobId, artifacts: &ArtifactUrls) -> DbResult<()> {
        let query = sqlx::query(
            "UPDATE jobs SET status = 'completed', audio_url = $2, subtitles_url = $3, \
             video_url = $4, error = NULL, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id.as_str())
        .bind(&artifacts.audio)
        .bind(&artifacts.subtitles)
        .bind(&artifacts.video);
        self.guarded_update("complete", id, JobStatus::Completed, query).await
    }

    async fn fail(&self, id: &JobId, error: &str) -> DbResult<()> {
        let query = sqlx::query(
            "UPDATE jobs SET status = 'failed', error = $2, updated_at = NOW() \
             WHERE id = $1 AND status NOT IN ('completed', 'failed')",
        )
        .bind(id.as_str())
        .bind(error);
        self.guarded_update("fail", id, JobStatus::Failed, query).await
    }

    async fn subscribe_pending(&self) -> DbResult<Box<dyn JobSubscription>> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(PENDING_CHANNEL).await?;
        record_subscription();
        debug!("Listening on {}", PENDING_CHANNEL);
        Ok(Box::new(PgJobSubscription { listener }))
    }

    async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// LISTEN subscription on [`PENDING_CHANNEL`].
pub struct PgJobSubscription {
    listener: PgListener,
}

#[async_trait]
impl JobSubscription for PgJobSubscription {
    async fn next(&mut self) -> DbResult<Option<JobId>> {
        // try_recv yields None when the connection dropped; the caller resubscribes.
        match self.listener.try_recv().await {
            Ok(Some(notification)) => Ok(Some(JobId::from_string(notification.payload()))),
            Ok(None) => Ok(None),
            Err(e) => Err(DbError::subscription(e.to_string())),
        }
    }
}
