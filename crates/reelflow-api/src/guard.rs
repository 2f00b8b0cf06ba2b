//! Request guards for side-effecting routes.
//!
//! A guarded request first spends one hit of the tenant's rate policy. With
//! an `Idempotency-Key` header, a prior response stored under the same key
//! and operation is replayed without re-running the handler; the same key on
//! a different operation is a conflict. Only successful responses are stored.

use std::future::Future;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use reelflow_core::{IdempotencyOutcome, RatePolicy};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Set on replayed responses.
pub const REPLAYED_HEADER: &str = "Idempotent-Replayed";

/// The operation a guarded request performs.
pub struct Operation<'a> {
    pub policy: &'a RatePolicy,
    pub method: &'a Method,
    pub path: &'a str,
    pub success: StatusCode,
}

/// Run `op` behind the tenant's rate policy and the idempotency guard.
pub async fn guarded<T, F, Fut>(
    state: &AppState,
    user: &AuthUser,
    headers: &HeaderMap,
    operation: Operation<'_>,
    op: F,
) -> ApiResult<Response>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
{
    state
        .rate_limiter
        .check(operation.policy, user.tenant_id.as_str())
        .await?;

    let key = idempotency_key(headers)?;

    if let Some(key) = key {
        match state
            .idempotency
            .begin(&user.tenant_id, key, operation.method.as_str(), operation.path)
            .await?
        {
            IdempotencyOutcome::Proceed => {}
            IdempotencyOutcome::Replay {
                status_code,
                payload,
            } => {
                let status = StatusCode::from_u16(status_code).unwrap_or(operation.success);
                let mut response = (status, Json(payload)).into_response();
                response
                    .headers_mut()
                    .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
                return Ok(response);
            }
            IdempotencyOutcome::Conflict => {
                return Err(ApiError::Conflict(
                    "Idempotency key already used for a different request".to_string(),
                ));
            }
        }
    }

    let result = op().await?;
    let payload = serde_json::to_value(&result)
        .map_err(|e| ApiError::internal(format!("Failed to serialize response: {}", e)))?;

    if let Some(key) = key {
        if let Err(e) = state
            .idempotency
            .commit(
                &user.tenant_id,
                key,
                operation.method.as_str(),
                operation.path,
                operation.success.as_u16(),
                payload.clone(),
            )
            .await
        {
            warn!(
                tenant_id = %user.tenant_id,
                path = operation.path,
                error = %e,
                "Failed to store idempotent response"
            );
        }
    }

    Ok((operation.success, Json(payload)).into_response())
}

/// Optional `Idempotency-Key` header; must be valid UTF-8.
fn idempotency_key(headers: &HeaderMap) -> ApiResult<Option<&str>> {
    match headers.get(IDEMPOTENCY_KEY_HEADER) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| ApiError::Validation("Idempotency key must be printable ASCII".into())),
    }
}
