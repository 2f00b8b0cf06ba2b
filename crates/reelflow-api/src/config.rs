//! API configuration.

use std::str::FromStr;

use reelflow_core::broker::DEFAULT_CAPACITY;
use reelflow_core::{CoreError, CoreResult, GuardConfig};

const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Per-IP requests per second on the /api routes
    pub rate_limit_rps: u32,
    /// Max request body size
    pub max_body_size: usize,
    /// Environment (development/production)
    pub environment: String,
    /// HS256 secret for caller bearer tokens
    pub jwt_secret: String,
    /// Shared secret workers send in `X-Worker-Secret`
    pub worker_shared_secret: String,
    /// Redis for the queue and the request guards; in-memory when unset
    pub redis_url: Option<String>,
    /// Snapshots retained per job for live subscribers
    pub broker_capacity: usize,
    /// Idempotency and rate limit policies
    pub guards: GuardConfig,
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// `JWT_SECRET` and `WORKER_SHARED_SECRET` are required.
    pub fn from_env() -> CoreResult<Self> {
        let jwt_secret = required("JWT_SECRET")?;
        let worker_shared_secret = required("WORKER_SHARED_SECRET")?;

        Ok(Self {
            host: string_or("API_HOST", "0.0.0.0"),
            port: parsed_or("API_PORT", 8000),
            cors_origins: string_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            rate_limit_rps: parsed_or("RATE_LIMIT_RPS", 20),
            max_body_size: parsed_or("MAX_BODY_SIZE", DEFAULT_MAX_BODY_SIZE),
            environment: string_or("ENVIRONMENT", "development"),
            jwt_secret,
            worker_shared_secret,
            redis_url: std::env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty()),
            broker_capacity: match parsed_or("BROKER_CAPACITY", DEFAULT_CAPACITY) {
                0 => DEFAULT_CAPACITY,
                n => n,
            },
            guards: GuardConfig::from_env(),
        })
    }

    /// Local defaults around the two secrets.
    pub fn with_secrets(jwt_secret: impl Into<String>, worker_shared_secret: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 20,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            environment: "development".to_string(),
            jwt_secret: jwt_secret.into(),
            worker_shared_secret: worker_shared_secret.into(),
            redis_url: None,
            broker_capacity: DEFAULT_CAPACITY,
            guards: GuardConfig::default(),
        }
    }

    /// Check if running in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.to_lowercase() == "production"
    }
}

fn string_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Unset or unparsable values fall back to `default`.
fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn required(name: &str) -> CoreResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(CoreError::configuration_missing(name)),
    }
}
