//! Worker and transport callbacks, authenticated with the worker secret.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use reelflow_core::AdvanceRequest;
use reelflow_models::{DeliveryId, DeliveryStatus, Job, JobId, JobStatus, TenantId, WebhookDelivery};

use crate::auth::WorkerAuth;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AdvanceJobRequest {
    pub tenant_id: String,
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryResultRequest {
    pub status: DeliveryStatus,
    pub response_code: Option<u16>,
    pub error: Option<String>,
}

/// `POST /internal/jobs/{id}/advance`. Updates to terminal jobs return the
/// stored job unchanged.
pub async fn advance_job(
    State(state): State<AppState>,
    _worker: WorkerAuth,
    Path(job_id): Path<String>,
    Json(request): Json<AdvanceJobRequest>,
) -> ApiResult<Json<Job>> {
    let job = state
        .jobs
        .advance(
            &TenantId::from(request.tenant_id),
            &JobId::from(job_id),
            AdvanceRequest {
                status: request.status,
                progress: request.progress,
                message: request.message,
            },
        )
        .await?;
    Ok(Json(job))
}

/// `POST /internal/webhooks/deliveries/{id}/result`.
pub async fn record_delivery_result(
    State(state): State<AppState>,
    _worker: WorkerAuth,
    Path(delivery_id): Path<String>,
    Json(request): Json<DeliveryResultRequest>,
) -> ApiResult<Json<WebhookDelivery>> {
    let delivery = state
        .webhooks
        .record_delivery_result(
            &DeliveryId::from(delivery_id),
            request.status,
            request.response_code,
            request.error,
        )
        .await?;
    Ok(Json(delivery))
}
