//! API middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::guard::{IDEMPOTENCY_KEY_HEADER, REPLAYED_HEADER};
use crate::metrics;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Longest caller-supplied request id that is kept.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Tracked addresses before idle limiters are swept.
const MAX_TRACKED_IPS: usize = 10_000;

const CORS_MAX_AGE: Duration = Duration::from_secs(600);

/// Health and scrape paths are not access-logged.
const QUIET_PATHS: [&str; 3] = ["/health", "/ready", "/metrics"];

const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("X-Content-Type-Options", "nosniff"),
    ("X-Frame-Options", "DENY"),
    ("Strict-Transport-Security", "max-age=31536000; includeSubDomains"),
    ("Referrer-Policy", "no-referrer"),
    ("Cross-Origin-Resource-Policy", "same-origin"),
    ("Cache-Control", "no-store"),
];

/// Per-address burst protection in front of every `/api` route.
///
/// Tenant policies such as `jobs:create` are separate and enforced by the
/// guarded handlers.
pub struct IpThrottle {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl IpThrottle {
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            limiter: RateLimiter::keyed(Quota::per_second(rps)),
        }
    }

    /// Spend one cell for `ip`. Returns false when its bucket is empty.
    pub fn allow(&self, ip: IpAddr) -> bool {
        if self.limiter.len() >= MAX_TRACKED_IPS {
            self.limiter.retain_recent();
            self.limiter.shrink_to_fit();
            debug!(tracked = self.limiter.len(), "Swept idle IP limiters");
        }
        self.limiter.check_key(&ip).is_ok()
    }

    pub fn tracked(&self) -> usize {
        self.limiter.len()
    }
}

/// CORS for browser clients. `*` opens every origin without credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().max_age(CORS_MAX_AGE);

    if origins.iter().any(|o| o == "*") {
        return base
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
            .expose_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("idempotency-key"),
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([
            header::RETRY_AFTER,
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("idempotent-replayed"),
        ])
}

pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
    response
}

/// Request id stored in request extensions.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Keep a usable caller-supplied `X-Request-ID` or mint one, expose it as a
/// `RequestId` extension and echo it on the response.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response<Body> {
    let id = header_str(request.headers(), REQUEST_ID_HEADER)
        .filter(|s| !s.is_empty() && s.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(id.clone()));
    let mut response = next.run(request).await;

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Access log line per request.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let replayable = request.headers().contains_key(IDEMPOTENCY_KEY_HEADER);
    let start = Instant::now();

    let response = next.run(request).await;

    if QUIET_PATHS.contains(&path.as_str()) {
        return response;
    }

    let headers = response.headers();
    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        request_id = header_str(headers, REQUEST_ID_HEADER).unwrap_or("-"),
        idempotency_key = replayable,
        replayed = headers.contains_key(REPLAYED_HEADER),
        "Request completed"
    );
    response
}

pub async fn rate_limit_middleware(
    State(throttle): State<Arc<IpThrottle>>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let Some(ip) = client_ip(&request) else {
        return next.run(request).await;
    };

    if throttle.allow(ip) {
        return next.run(request).await;
    }

    warn!(ip = %ip, path = %request.uri().path(), "IP rate limit exceeded");
    metrics::record_ip_rate_limit_hit(request.uri().path());
    (
        StatusCode::TOO_MANY_REQUESTS,
        [(header::RETRY_AFTER, "1")],
        "Too many requests from this address",
    )
        .into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Client address: first `X-Forwarded-For` hop, then `X-Real-IP`, then the
/// socket peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    let headers = request.headers();
    let forwarded = header_str(headers, "X-Forwarded-For")
        .and_then(|list| list.split(',').next())
        .or_else(|| header_str(headers, "X-Real-IP"))
        .and_then(|s| s.trim().parse().ok());

    forwarded.or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    })
}
