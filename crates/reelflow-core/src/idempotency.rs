//! Idempotency guard for side-effecting control requests.
//!
//! A request carrying an idempotency key first calls `begin`. The first
//! request proceeds and, if it succeeds, `commit`s its response; repeats of
//! the same method and path replay that response verbatim, while reuse of the
//! key for a different operation is a conflict.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use reelflow_models::{IdempotencyRecord, TenantId};

use crate::error::{CoreError, CoreResult};
use crate::metrics;
use crate::store::IdempotencyStore;

/// Longest accepted key.
pub const MAX_KEY_LEN: usize = 255;

/// Result of `begin`.
#[derive(Debug, Clone, PartialEq)]
pub enum IdempotencyOutcome {
    /// No prior response: execute the request.
    Proceed,
    /// Prior response for the same operation.
    Replay {
        status_code: u16,
        payload: serde_json::Value,
    },
    /// Key already used for a different method or path.
    Conflict,
}

/// Keys are 1-255 printable ASCII characters.
pub fn validate_key(key: &str) -> CoreResult<()> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(CoreError::validation(format!(
            "Idempotency key must be 1-{} characters",
            MAX_KEY_LEN
        )));
    }
    if !key.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(CoreError::validation(
            "Idempotency key must be printable ASCII",
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    pub async fn begin(
        &self,
        tenant_id: &TenantId,
        key: &str,
        method: &str,
        path: &str,
    ) -> CoreResult<IdempotencyOutcome> {
        validate_key(key)?;

        let Some(record) = self.store.get_record(tenant_id, key).await? else {
            return Ok(IdempotencyOutcome::Proceed);
        };

        if record.matches(method, path) {
            debug!(tenant_id = %tenant_id, key = key, "Replaying idempotent response");
            metrics::record_idempotency_replay();
            Ok(IdempotencyOutcome::Replay {
                status_code: record.status_code,
                payload: record.payload,
            })
        } else {
            warn!(
                tenant_id = %tenant_id,
                key = key,
                method = method,
                path = path,
                "Idempotency key reused for a different operation"
            );
            Ok(IdempotencyOutcome::Conflict)
        }
    }

    /// Persist the response of a successful request. A second commit for the
    /// same key keeps the first record.
    pub async fn commit(
        &self,
        tenant_id: &TenantId,
        key: &str,
        method: &str,
        path: &str,
        status_code: u16,
        payload: serde_json::Value,
    ) -> CoreResult<()> {
        validate_key(key)?;

        let record = IdempotencyRecord {
            tenant_id: tenant_id.clone(),
            key: key.to_string(),
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            status_code,
            payload,
            created_at: Utc::now(),
        };

        if !self.store.insert_record(&record).await? {
            debug!(tenant_id = %tenant_id, key = key, "Idempotency record already committed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn guard() -> IdempotencyGuard {
        IdempotencyGuard::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_begin_commit_replay() {
        let guard = guard();
        let tenant = TenantId::from("t1");

        let outcome = guard.begin(&tenant, "k1", "POST", "/api/jobs").await.unwrap();
        assert_eq!(outcome, IdempotencyOutcome::Proceed);

        let payload = json!({"id": "job-1", "status": "QUEUED"});
        guard
            .commit(&tenant, "k1", "POST", "/api/jobs", 201, payload.clone())
            .await
            .unwrap();

        let outcome = guard.begin(&tenant, "k1", "post", "/api/jobs").await.unwrap();
        assert_eq!(
            outcome,
            IdempotencyOutcome::Replay {
                status_code: 201,
                payload
            }
        );
    }

    #[tokio::test]
    async fn test_first_commit_wins() {
        let guard = guard();
        let tenant = TenantId::from("t1");

        guard
            .commit(&tenant, "k1", "POST", "/api/jobs", 201, json!({"n": 1}))
            .await
            .unwrap();
        guard
            .commit(&tenant, "k1", "POST", "/api/jobs", 500, json!({"n": 2}))
            .await
            .unwrap();

        let outcome = guard.begin(&tenant, "k1", "POST", "/api/jobs").await.unwrap();
        assert_eq!(
            outcome,
            IdempotencyOutcome::Replay {
                status_code: 201,
                payload: json!({"n": 1})
            }
        );
    }

    #[tokio::test]
    async fn test_key_reuse_on_other_path_conflicts() {
        let guard = guard();
        let tenant = TenantId::from("t1");
        guard
            .commit(&tenant, "k1", "POST", "/api/jobs/a/cancel", 200, json!({}))
            .await
            .unwrap();

        let outcome = guard
            .begin(&tenant, "k1", "POST", "/api/jobs/b/cancel")
            .await
            .unwrap();
        assert_eq!(outcome, IdempotencyOutcome::Conflict);
    }

    #[tokio::test]
    async fn test_keys_are_tenant_scoped() {
        let guard = guard();
        guard
            .commit(&TenantId::from("t1"), "k1", "POST", "/api/jobs", 201, json!({}))
            .await
            .unwrap();

        let outcome = guard
            .begin(&TenantId::from("t2"), "k1", "POST", "/api/jobs")
            .await
            .unwrap();
        assert_eq!(outcome, IdempotencyOutcome::Proceed);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("abc-123_XYZ").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key("has space").is_ok());
        assert!(validate_key("tab\tkey").is_err());
        assert!(validate_key("caf\u{e9}").is_err());
        assert!(validate_key(&"a".repeat(256)).is_err());
        assert!(validate_key(&"a".repeat(255)).is_ok());
    }
}
