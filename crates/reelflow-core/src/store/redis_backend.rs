//! Redis backends for the request guards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use tracing::debug;

use reelflow_models::{IdempotencyRecord, TenantId};

use super::{IdempotencyStore, RateLimitStore};
use crate::error::StoreResult;
use crate::rate_limit::RateDecision;

const IDEMPOTENCY_KEY_PREFIX: &str = "reelflow:idem";
const RATE_LIMIT_KEY_PREFIX: &str = "reelflow:rl";

/// Default lifetime of idempotency records.
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;

/// Idempotency records stored as JSON under `SET NX EX`.
pub struct RedisIdempotencyStore {
    client: redis::Client,
    ttl_secs: u64,
}

impl RedisIdempotencyStore {
    pub fn new(client: redis::Client, ttl_secs: u64) -> Self {
        Self {
            client,
            ttl_secs: ttl_secs.max(1),
        }
    }

    fn key(tenant_id: &TenantId, key: &str) -> String {
        format!("{}:{}:{}", IDEMPOTENCY_KEY_PREFIX, tenant_id, key)
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn get_record(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> StoreResult<Option<IdempotencyRecord>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(Self::key(tenant_id, key)).await?;

        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let body = serde_json::to_string(record)?;

        let result: Option<String> = redis::cmd("SET")
            .arg(Self::key(&record.tenant_id, &record.key))
            .arg(&body)
            .arg("NX")
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }
}

/// Fixed-window counters: one key per (scope, identity) expiring with the window.
pub struct RedisRateLimitStore {
    client: redis::Client,
}

impl RedisRateLimitStore {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    fn key(scope: &str, identity: &str) -> String {
        format!("{}:{}:{}", RATE_LIMIT_KEY_PREFIX, scope, identity)
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    /// The window is the key's lifetime, so `now` is not consulted. Rejected
    /// hits still bump the stored count past `limit`; the decision only
    /// depends on whether the count exceeds it.
    async fn hit(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window_secs: u64,
        _now: DateTime<Utc>,
    ) -> StoreResult<RateDecision> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = Self::key(scope, identity);

        let (count, ttl): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(&key)
            .arg(0)
            .arg("NX")
            .arg("EX")
            .arg(window_secs)
            .ignore()
            .cmd("INCR")
            .arg(&key)
            .cmd("TTL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        if count <= i64::from(limit) {
            return Ok(RateDecision::Allowed {
                count: count.max(1) as u32,
            });
        }

        let window = window_secs as i64;
        let retry_after_secs = if ttl > 0 { ttl.min(window) } else { window };
        debug!(key = %key, count = count, ttl = ttl, "Redis rate limit window exhausted");

        Ok(RateDecision::Rejected {
            retry_after_secs: retry_after_secs.max(1) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(
            RedisIdempotencyStore::key(&TenantId::from("t1"), "k1"),
            "reelflow:idem:t1:k1"
        );
        assert_eq!(
            RedisRateLimitStore::key("jobs:create", "t1"),
            "reelflow:rl:jobs:create:t1"
        );
    }
}
