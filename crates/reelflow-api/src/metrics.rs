//! Prometheus metrics for the API server.

use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return its render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "reelflow_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "reelflow_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "reelflow_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "reelflow_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "reelflow_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "reelflow_ws_messages_sent_total";

    // Webhook transport
    pub const WEBHOOK_SEND_DURATION_SECONDS: &str = "reelflow_webhook_send_duration_seconds";

    // Per-IP burst limiter
    pub const IP_RATE_LIMIT_HITS_TOTAL: &str = "reelflow_ip_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record WebSocket connection.
pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

/// Update active WebSocket connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record WebSocket message sent.
pub fn record_ws_message_sent(endpoint: &str, message_type: &str) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("type", message_type.to_string()),
    ];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

/// Record one webhook POST.
pub fn record_webhook_send(outcome: &str, duration_secs: f64) {
    let labels = [("outcome", outcome.to_string())];
    histogram!(names::WEBHOOK_SEND_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record per-IP rate limit hit.
pub fn record_ip_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", sanitize_path(endpoint))];
    counter!(names::IP_RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collection segments whose next segment is a record id.
const ID_PARENTS: [&str; 8] = [
    "jobs",
    "webhooks",
    "deliveries",
    "video",
    "clip",
    "transcript",
    "project",
    "retell",
];

/// Replace record ids in a path with `:id` so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    let mut out = Vec::new();
    let mut previous = "";

    let is_collection = |s: &str| ID_PARENTS.contains(&s) || ID_PARENTS.contains(&s.trim_end_matches('s'));

    for segment in path.split('/') {
        let is_id = !segment.is_empty() && is_collection(previous) && !is_collection(segment);
        out.push(if is_id { ":id" } else { segment });
        previous = segment;
    }

    out.join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/jobs/550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/api/jobs/:id/cancel"
        );
        assert_eq!(
            sanitize_path("/api/resources/videos/v-123"),
            "/api/resources/videos/:id"
        );
        assert_eq!(
            sanitize_path("/internal/webhooks/deliveries/d1/result"),
            "/internal/webhooks/deliveries/:id/result"
        );
        assert_eq!(sanitize_path("/ws/jobs/j1"), "/ws/jobs/:id");
        assert_eq!(sanitize_path("/api/jobs"), "/api/jobs");
        assert_eq!(sanitize_path("/health"), "/health");
    }
}
