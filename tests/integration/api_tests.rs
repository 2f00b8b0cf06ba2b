//! API integration tests over the in-memory backends.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use reelflow_api::auth::{issue_token, WORKER_SECRET_HEADER};
use reelflow_api::{create_router, ApiConfig, AppState};
use reelflow_core::RatePolicy;
use reelflow_models::TenantId;
use reelflow_queue::InMemoryTaskQueue;

const JWT_SECRET: &str = "test-jwt-secret";
const WORKER_SECRET: &str = "test-worker-secret";

struct TestApp {
    router: Router,
    state: AppState,
    queue: Arc<InMemoryTaskQueue>,
}

fn test_app_with(config: ApiConfig) -> TestApp {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let state = AppState::in_memory(config, queue.clone());
    TestApp {
        router: create_router(state.clone(), None),
        state,
        queue,
    }
}

fn test_app() -> TestApp {
    test_app_with(ApiConfig::with_secrets(JWT_SECRET, WORKER_SECRET))
}

fn token(tenant: &str) -> String {
    issue_token(JWT_SECRET, "user-1", &TenantId::from(tenant), 3600).unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, headers, body)
}

fn api(method: &str, uri: &str, tenant: &str, body: Option<Value>) -> axum::http::request::Builder {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token(tenant)));
    match body {
        Some(_) => builder.header(header::CONTENT_TYPE, "application/json"),
        None => builder,
    }
}

fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn call(method: &str, uri: &str, tenant: &str, body: Option<Value>) -> Request<Body> {
    with_body(api(method, uri, tenant, body.clone()), body)
}

fn worker(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(WORKER_SECRET_HEADER, WORKER_SECRET)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn clip_discovery() -> Value {
    json!({"job_type": "clip_discovery", "project_id": "p1", "video_id": "v1"})
}

async fn create_job(app: &TestApp, tenant: &str) -> Value {
    let (status, _, body) = send(app, call("POST", "/api/jobs", tenant, Some(clip_discovery()))).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

async fn advance(app: &TestApp, id: &str, tenant: &str, status: &str) -> Value {
    let (code, _, body) = send(
        app,
        worker(
            &format!("/internal/jobs/{}/advance", id),
            json!({"tenant_id": tenant, "status": status}),
        ),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    body
}

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app();

    let (status, headers, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(headers.contains_key("x-request-id"));
    assert_eq!(headers["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn test_metrics_route_absent_when_disabled() {
    let app = test_app();
    let (status, _, _) = send(
        &app,
        Request::builder().uri("/metrics").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let app = test_app();

    let (status, _, body) = send(
        &app,
        Request::builder().uri("/api/jobs").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let forged = issue_token("other-secret", "user-1", &TenantId::from("t1"), 3600).unwrap();
    let (status, _, _) = send(
        &app,
        Request::builder()
            .uri("/api/jobs")
            .header(header::AUTHORIZATION, format!("Bearer {}", forged))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_and_read_job_is_tenant_scoped() {
    let app = test_app();
    let job = create_job(&app, "tenant-1").await;
    let id = job["id"].as_str().unwrap();

    assert_eq!(job["status"], "QUEUED");
    assert_eq!(job["tenant_id"], "tenant-1");
    assert_eq!(app.queue.len(), 1);
    assert_eq!(app.queue.tasks()[0].task_name, "pipeline.clip_discovery");

    let (status, _, body) = send(&app, call("GET", &format!("/api/jobs/{}", id), "tenant-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);

    let (status, _, _) = send(&app, call("GET", &format!("/api/jobs/{}", id), "tenant-2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send(&app, call("GET", "/api/jobs", "tenant-2", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_create_with_invalid_refs_is_bad_request() {
    let app = test_app();
    let (status, _, body) = send(
        &app,
        call(
            "POST",
            "/api/jobs",
            "tenant-1",
            Some(json!({"job_type": "voice_render", "project_id": "p1"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");
    assert!(app.queue.is_empty());
}

#[tokio::test]
async fn test_idempotent_create_replays_response() {
    let app = test_app();
    let request = || {
        with_body(
            api("POST", "/api/jobs", "tenant-1", Some(clip_discovery())).header("Idempotency-Key", "create-1"),
            Some(clip_discovery()),
        )
    };

    let (first_status, first_headers, first) = send(&app, request()).await;
    let (second_status, second_headers, second) = send(&app, request()).await;

    assert_eq!(first_status, StatusCode::CREATED);
    assert_eq!(second_status, StatusCode::CREATED);
    assert_eq!(first, second);
    assert!(!first_headers.contains_key("idempotent-replayed"));
    assert_eq!(second_headers["idempotent-replayed"], "true");
    assert_eq!(app.queue.len(), 1);

    // Same key, different operation
    let id = first["id"].as_str().unwrap();
    let (status, _, _) = send(
        &app,
        with_body(
            api("POST", &format!("/api/jobs/{}/cancel", id), "tenant-1", None).header("Idempotency-Key", "create-1"),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Keys are per tenant
    let (status, headers, other) = send(
        &app,
        with_body(
            api("POST", "/api/jobs", "tenant-2", Some(clip_discovery())).header("Idempotency-Key", "create-1"),
            Some(clip_discovery()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(!headers.contains_key("idempotent-replayed"));
    assert_ne!(other["id"], first["id"]);
}

#[tokio::test]
async fn test_create_rate_limit_returns_retry_after() {
    let mut config = ApiConfig::with_secrets(JWT_SECRET, WORKER_SECRET);
    config.guards.jobs_create = RatePolicy::new("jobs:create", 2, 60);
    let app = test_app_with(config);

    create_job(&app, "tenant-1").await;
    create_job(&app, "tenant-1").await;

    let (status, headers, body) =
        send(&app, call("POST", "/api/jobs", "tenant-1", Some(clip_discovery()))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "rate_limited");

    let retry_after = body["retry_after_seconds"].as_u64().unwrap();
    assert!((1..=60).contains(&retry_after));
    assert_eq!(
        headers[header::RETRY_AFTER].to_str().unwrap(),
        retry_after.to_string()
    );

    // Other tenants have their own window
    create_job(&app, "tenant-2").await;
}

#[tokio::test]
async fn test_worker_callbacks_require_secret() {
    let app = test_app();
    let job = create_job(&app, "tenant-1").await;

    let (status, _, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri(format!("/internal/jobs/{}/advance", job["id"].as_str().unwrap()))
            .header(header::CONTENT_TYPE, "application/json")
            .header(WORKER_SECRET_HEADER, "wrong")
            .body(Body::from(json!({"tenant_id": "tenant-1", "status": "RUNNING"}).to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_clip_discovery_success_flows_to_resource_and_webhooks() {
    let app = test_app();

    let (status, _, endpoint) = send(
        &app,
        call(
            "POST",
            "/api/webhooks",
            "tenant-1",
            Some(json!({"url": "https://hooks.example.com/reelflow", "events": ["job.updated"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(endpoint["secret"].as_str().unwrap().starts_with("whsec_"));

    let job = create_job(&app, "tenant-1").await;
    let id = job["id"].as_str().unwrap();

    let running = advance(&app, id, "tenant-1", "RUNNING").await;
    assert_eq!(running["status"], "RUNNING");
    let done = advance(&app, id, "tenant-1", "SUCCEEDED").await;
    assert_eq!(done["status"], "SUCCEEDED");
    assert_eq!(done["progress"], 1.0);

    let (status, _, video) = send(&app, call("GET", "/api/resources/videos/v1", "tenant-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(video["video_status"], "READY_FOR_CLIP_REVIEW");

    // created, running, succeeded
    let pending = app.state.webhooks.pending(100).await.unwrap();
    assert_eq!(pending.len(), 3);
    assert!(pending
        .iter()
        .any(|d| d.payload["data"]["job"]["status"] == "SUCCEEDED"));

    let (status, _, delivery) = send(
        &app,
        worker(
            &format!("/internal/webhooks/deliveries/{}/result", pending[0].id),
            json!({"status": "succeeded", "response_code": 200}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivery["status"], "succeeded");
    assert_eq!(app.state.webhooks.pending(100).await.unwrap().len(), 2);

    let (status, _, _) = send(
        &app,
        worker(
            &format!("/internal/webhooks/deliveries/{}/result", pending[0].id),
            json!({"status": "failed", "response_code": 500, "error": "retry storm"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(app.state.webhooks.pending(100).await.unwrap().len(), 2);

    // A late update to the terminal job is ignored
    let again = advance(&app, id, "tenant-1", "FAILED").await;
    assert_eq!(again, done);
}

#[tokio::test]
async fn test_cancel_succeeded_job_conflicts() {
    let app = test_app();
    let job = create_job(&app, "tenant-1").await;
    let id = job["id"].as_str().unwrap();
    advance(&app, id, "tenant-1", "RUNNING").await;
    let done = advance(&app, id, "tenant-1", "SUCCEEDED").await;

    let (status, _, body) = send(
        &app,
        call(
            "POST",
            &format!("/api/jobs/{}/cancel", id),
            "tenant-1",
            Some(json!({"reason": "changed my mind"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let (_, _, stored) = send(&app, call("GET", &format!("/api/jobs/{}", id), "tenant-1", None)).await;
    assert_eq!(stored, done);
}

#[tokio::test]
async fn test_cancel_then_retry_requeues() {
    let app = test_app();
    let job = create_job(&app, "tenant-1").await;
    let id = job["id"].as_str().unwrap();

    let (status, _, cancelled) = send(&app, call("POST", &format!("/api/jobs/{}/cancel", id), "tenant-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "CANCELLED");
    assert_eq!(cancelled["message"], "Cancelled by user");

    let (status, _, retried) = send(&app, call("POST", &format!("/api/jobs/{}/retry", id), "tenant-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retried["status"], "QUEUED");
    assert_eq!(retried["retry_count"], 1);
    assert_eq!(retried["progress"], 0.0);
    assert_eq!(app.queue.len(), 2);
}

#[tokio::test]
async fn test_webhook_management() {
    let app = test_app();

    let (status, _, body) = send(
        &app,
        call(
            "POST",
            "/api/webhooks",
            "tenant-1",
            Some(json!({"url": "not a url", "events": ["job.updated"]})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_error");

    let (status, _, _) = send(
        &app,
        call(
            "POST",
            "/api/webhooks",
            "tenant-1",
            Some(json!({"url": "https://hooks.example.com/a", "events": []})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, created) = send(
        &app,
        call(
            "POST",
            "/api/webhooks",
            "tenant-1",
            Some(json!({
                "url": "https://hooks.example.com/a",
                "events": ["clips.discovered", "job.updated"],
                "secret": "0123456789abcdef-secret"
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["secret"], "0123456789abcdef-secret");
    let id = created["id"].as_str().unwrap();

    let (_, _, listed) = send(&app, call("GET", "/api/webhooks", "tenant-1", None)).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert!(listed[0].get("secret").is_none());

    let (status, _, _) = send(&app, call("DELETE", &format!("/api/webhooks/{}", id), "tenant-2", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, deleted) = send(&app, call("DELETE", &format!("/api/webhooks/{}", id), "tenant-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["active"], false);
}

#[tokio::test]
async fn test_unknown_resource_kind_is_bad_request() {
    let app = test_app();
    let (status, _, _) = send(&app, call("GET", "/api/resources/widgets/w1", "tenant-1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(&app, call("GET", "/api/resources/videos/never-touched", "tenant-1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
