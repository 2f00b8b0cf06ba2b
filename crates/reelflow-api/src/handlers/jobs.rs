//! Job control handlers.
//!
//! Create and control routes run behind the tenant's rate policy and honour
//! `Idempotency-Key`. Reads are tenant-scoped through the caller's token.

use axum::extract::{OriginalUri, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;

use reelflow_core::JobFilter;
use reelflow_models::{Job, JobId, JobRefs, JobStatus, JobType, NewJob, ProjectId};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::guard::{guarded, Operation};
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 50;
const MAX_LIST_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: JobType,
    #[serde(flatten)]
    pub refs: JobRefs,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub project_id: Option<String>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelJobRequest {
    pub reason: Option<String>,
}

/// Create a job and hand it to the worker pool.
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<Response> {
    let operation = Operation {
        policy: &state.config.guards.jobs_create,
        method: &method,
        path: uri.path(),
        success: StatusCode::CREATED,
    };

    let jobs = state.jobs.clone();
    let new = NewJob {
        tenant_id: user.tenant_id.clone(),
        job_type: request.job_type,
        refs: request.refs,
    };

    guarded(&state, &user, &headers, operation, move || async move {
        jobs.create(new).await.map_err(ApiError::from)
    })
    .await
}

pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let filter = JobFilter {
        project_id: query.project_id.map(ProjectId::from),
        status: query.status,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)),
    };

    let jobs = state.jobs.list(&user.tenant_id, &filter).await?;
    Ok(Json(jobs))
}

pub async fn get_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Job>> {
    let job = state.jobs.get(&user.tenant_id, &JobId::from(job_id)).await?;
    Ok(Json(job))
}

/// User-issued lifecycle command.
#[derive(Debug, Clone)]
enum Control {
    Cancel(Option<String>),
    Pause,
    Resume,
    Retry,
}

async fn control(
    state: AppState,
    user: AuthUser,
    method: Method,
    path: &str,
    headers: HeaderMap,
    job_id: String,
    action: Control,
) -> ApiResult<Response> {
    let operation = Operation {
        policy: &state.config.guards.jobs_control,
        method: &method,
        path,
        success: StatusCode::OK,
    };

    let jobs = state.jobs.clone();
    let tenant_id = user.tenant_id.clone();
    let id = JobId::from(job_id);

    guarded(&state, &user, &headers, operation, move || async move {
        let result = match action {
            Control::Cancel(reason) => jobs.cancel(&tenant_id, &id, reason).await,
            Control::Pause => jobs.pause(&tenant_id, &id).await,
            Control::Resume => jobs.resume(&tenant_id, &id).await,
            Control::Retry => jobs.retry(&tenant_id, &id).await,
        };
        result.map_err(ApiError::from)
    })
    .await
}

/// Cancel a job. The body is optional.
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(job_id): Path<String>,
    body: Option<Json<CancelJobRequest>>,
) -> ApiResult<Response> {
    let reason = body.and_then(|Json(b)| b.reason).filter(|r| !r.trim().is_empty());
    control(state, user, method, uri.path(), headers, job_id, Control::Cancel(reason)).await
}

pub async fn pause_job(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    control(state, user, method, uri.path(), headers, job_id, Control::Pause).await
}

pub async fn resume_job(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    control(state, user, method, uri.path(), headers, job_id, Control::Resume).await
}

/// Requeue a FAILED or CANCELLED job.
pub async fn retry_job(
    State(state): State<AppState>,
    user: AuthUser,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> ApiResult<Response> {
    control(state, user, method, uri.path(), headers, job_id, Control::Retry).await
}
