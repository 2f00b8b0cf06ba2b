//! Liveness and readiness checks.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Liveness: the process is serving requests.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Ok,
    Disabled,
    Error,
}

/// Outcome of one dependency check.
#[derive(Debug, Serialize)]
pub struct Check {
    pub status: CheckState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Check {
    fn new(status: CheckState, latency_ms: Option<u64>, detail: Option<String>) -> Self {
        Self {
            status,
            latency_ms,
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub redis: Check,
    pub broker: Check,
}

/// Queue round trip when the queue runs on Redis.
async fn check_redis(state: &AppState) -> Check {
    let Some(queue) = &state.redis_queue else {
        return Check::new(CheckState::Disabled, None, None);
    };

    let start = Instant::now();
    let result = queue.len().await;
    let latency = Some(start.elapsed().as_millis() as u64);
    match result {
        Ok(backlog) => Check::new(CheckState::Ok, latency, Some(format!("{} queued tasks", backlog))),
        Err(e) => Check::new(CheckState::Error, latency, Some(e.to_string())),
    }
}

/// Read-only view of the live broker.
fn check_broker(state: &AppState) -> Check {
    let detail = format!("{} live channels", state.broker.channel_count());
    Check::new(CheckState::Ok, None, Some(detail))
}

/// Readiness: 503 while any enabled dependency fails.
pub async fn ready(State(state): State<AppState>) -> Response {
    let redis = check_redis(&state).await;
    let broker = check_broker(&state);

    let healthy = [&redis, &broker]
        .iter()
        .all(|check| check.status != CheckState::Error);
    let (code, status) = if healthy {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        code,
        Json(ReadinessResponse {
            status,
            redis,
            broker,
        }),
    )
        .into_response()
}
