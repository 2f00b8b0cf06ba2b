//! API routes.

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    advance_job, cancel_job, create_job, delete_webhook, get_job, get_resource, health,
    list_jobs, list_webhooks, pause_job, ready, record_delivery_result, register_webhook,
    resume_job, retry_job,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers, IpThrottle,
};
use crate::state::AppState;
use crate::ws::ws_job;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
        .route("/jobs/:job_id/pause", post(pause_job))
        .route("/jobs/:job_id/resume", post(resume_job))
        .route("/jobs/:job_id/retry", post(retry_job));

    let resource_routes = Router::new().route("/resources/:kind/:id", get(get_resource));

    let webhook_routes = Router::new()
        .route("/webhooks", post(register_webhook).get(list_webhooks))
        .route("/webhooks/:endpoint_id", delete(delete_webhook));

    let throttle = Arc::new(IpThrottle::new(state.config.rate_limit_rps));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(resource_routes)
        .merge(webhook_routes)
        .layer(middleware::from_fn_with_state(throttle, rate_limit_middleware));

    // Worker callbacks, authenticated with the shared secret
    let internal_routes = Router::new()
        .route("/jobs/:job_id/advance", post(advance_job))
        .route(
            "/webhooks/deliveries/:delivery_id/result",
            post(record_delivery_result),
        );

    let ws_routes = Router::new().route("/ws/jobs/:job_id", get(ws_job));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .nest("/internal", internal_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
