//! Job submission and lookup handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use reel_models::{CreateJobRequest, Job, JobId, JobResponse, JobStatus};
use reel_storage::ArtifactKind;
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::auth::{AuthUser, MaybeAuthUser};
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Maximum job id length accepted in paths.
const MAX_JOB_ID_LEN: usize = 64;

/// Job ids are generated UUIDs; reject anything that could not be one of ours.
fn is_valid_job_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_JOB_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    if !is_valid_job_id(raw) {
        return Err(ApiError::bad_request("Invalid job id"));
    }
    Ok(JobId::from_string(raw))
}

async fn load_job(state: &AppState, id: &JobId) -> ApiResult<Job> {
    state
        .jobs
        .get(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", id)))
}

/// Create a job.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<JobResponse>)> {
    request
        .validate()
        .map_err(|e| ApiError::validation(e.to_string()))?;
    let job = request
        .into_job(&user.uid)
        .map_err(|e| ApiError::validation(e.to_string()))?;

    state.jobs.insert(&job).await?;
    metrics::record_job_created(job.duration_secs);

    info!(job_id = %job.id, user_id = %user.uid, duration = job.duration_secs, "Job created");
    Ok((StatusCode::CREATED, Json(JobResponse::from(&job))))
}

/// Fetch one of the caller's jobs.
pub async fn get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobResponse>> {
    let id = parse_job_id(&job_id)?;
    let job = load_job(&state, &id).await?;

    if !job.is_owned_by(&user.uid) {
        return Err(ApiError::forbidden("Not the owner of this job"));
    }
    Ok(Json(JobResponse::from(&job)))
}

/// Signed URL response.
#[derive(Debug, Serialize)]
pub struct FileUrlResponse {
    pub url: String,
    pub expires_in_secs: u64,
}

/// Issue a fresh signed URL for one artifact.
///
/// Owners may fetch at any time; anyone may fetch from a completed job.
pub async fn get_job_file(
    State(state): State<AppState>,
    MaybeAuthUser(user): MaybeAuthUser,
    Path((job_id, filename)): Path<(String, String)>,
) -> ApiResult<Json<FileUrlResponse>> {
    let id = parse_job_id(&job_id)?;
    let kind = ArtifactKind::from_file_name(&filename)
        .ok_or_else(|| ApiError::not_found(format!("Unknown file {}", filename)))?;
    let job = load_job(&state, &id).await?;

    let is_owner = user.as_ref().is_some_and(|u| job.is_owned_by(&u.uid));
    if !is_owner && job.status != JobStatus::Completed {
        return Err(match user {
            None => ApiError::unauthorized("Authentication required"),
            Some(_) => ApiError::forbidden("Not the owner of this job"),
        });
    }

    let url = state.publisher.signed_url(&id, kind).await?;
    metrics::record_file_url_issued(kind.file_name(), is_owner);

    Ok(Json(FileUrlResponse {
        url,
        expires_in_secs: state.publisher.url_ttl().as_secs(),
    }))
}
