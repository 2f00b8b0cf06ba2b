//! Records backing the idempotency and rate limit guards.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::TenantId;

/// Stored response of a side-effecting request, keyed by (tenant, key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IdempotencyRecord {
    pub tenant_id: TenantId,
    pub key: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether a repeated request targets the same operation.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        self.method.eq_ignore_ascii_case(method) && self.path == path
    }
}

/// Fixed-window counter keyed by (scope, identity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RateLimitCounter {
    pub scope: String,
    pub identity: String,
    pub window_start: DateTime<Utc>,
    pub count: u32,
}

impl RateLimitCounter {
    /// Seconds elapsed since the window opened (never negative).
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.window_start).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_matches_method_case_insensitively() {
        let record = IdempotencyRecord {
            tenant_id: TenantId::from("t1"),
            key: "k1".into(),
            method: "POST".into(),
            path: "/api/jobs".into(),
            status_code: 201,
            payload: serde_json::json!({"id": "j1"}),
            created_at: Utc::now(),
        };
        assert!(record.matches("post", "/api/jobs"));
        assert!(!record.matches("POST", "/api/jobs/j1/cancel"));
        assert!(!record.matches("DELETE", "/api/jobs"));
    }
}
