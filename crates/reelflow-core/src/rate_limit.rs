//! Fixed-window rate limiting per (scope, identity).
//!
//! A window opens on the first request. Requests are allowed while the
//! window's count is below the limit; further requests are rejected without
//! being counted until the window elapses.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use reelflow_models::RateLimitCounter;

use crate::error::{CoreError, CoreResult};
use crate::metrics;
use crate::store::RateLimitStore;

/// Scope for job creation.
pub const JOBS_CREATE: &str = "jobs:create";
/// Scope for cancel / pause / resume / retry.
pub const JOBS_CONTROL: &str = "jobs:control";
/// Scope for webhook endpoint management.
pub const WEBHOOKS_MANAGE: &str = "webhooks:manage";

/// Outcome of one hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { count: u32 },
    Rejected { retry_after_secs: u64 },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed { .. })
    }
}

/// A named limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatePolicy {
    pub scope: String,
    pub limit: u32,
    pub window_secs: u64,
}

impl RatePolicy {
    pub fn new(scope: impl Into<String>, limit: u32, window_secs: u64) -> Self {
        Self {
            scope: scope.into(),
            limit,
            window_secs,
        }
    }
}

/// Apply the fixed-window rule to the stored counter.
///
/// Returns the counter to persist (unchanged on rejection) and the decision.
pub fn apply_fixed_window(
    existing: Option<RateLimitCounter>,
    scope: &str,
    identity: &str,
    limit: u32,
    window_secs: u64,
    now: DateTime<Utc>,
) -> (RateLimitCounter, RateDecision) {
    let window = window_secs as i64;

    match existing {
        Some(mut counter) if counter.elapsed_secs(now) < window => {
            if counter.count < limit {
                counter.count += 1;
                let count = counter.count;
                (counter, RateDecision::Allowed { count })
            } else {
                let remaining = window - counter.elapsed_secs(now);
                let retry_after_secs = remaining.clamp(1, window.max(1)) as u64;
                (counter, RateDecision::Rejected { retry_after_secs })
            }
        }
        _ => (
            RateLimitCounter {
                scope: scope.to_string(),
                identity: identity.to_string(),
                window_start: now,
                count: 1,
            },
            RateDecision::Allowed { count: 1 },
        ),
    }
}

/// Rate limiter over a pluggable counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub async fn hit(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window_secs: u64,
    ) -> CoreResult<RateDecision> {
        self.hit_at(scope, identity, limit, window_secs, Utc::now())
            .await
    }

    /// Same as `hit` with an explicit clock reading.
    pub async fn hit_at(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> CoreResult<RateDecision> {
        if limit == 0 {
            return Err(CoreError::validation("rate limit must be at least 1"));
        }
        if window_secs == 0 {
            return Err(CoreError::validation("rate limit window must be at least 1s"));
        }

        let decision = self
            .store
            .hit(scope, identity, limit, window_secs, now)
            .await?;

        if let RateDecision::Rejected { retry_after_secs } = decision {
            debug!(
                scope = scope,
                identity = identity,
                retry_after_secs = retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limit_rejection(scope);
        }

        Ok(decision)
    }

    /// Count a request against a policy, failing with `RateLimited` on rejection.
    pub async fn check(&self, policy: &RatePolicy, identity: &str) -> CoreResult<()> {
        match self
            .hit(&policy.scope, identity, policy.limit, policy.window_secs)
            .await?
        {
            RateDecision::Allowed { .. } => Ok(()),
            RateDecision::Rejected { retry_after_secs } => {
                Err(CoreError::RateLimited { retry_after_secs })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_rejects_hit_over_limit() {
        let limiter = limiter();
        let t0 = Utc::now();

        for i in 1..=3 {
            let decision = limiter.hit_at(JOBS_CREATE, "t1", 3, 60, t0).await.unwrap();
            assert_eq!(decision, RateDecision::Allowed { count: i });
        }

        let decision = limiter
            .hit_at(JOBS_CREATE, "t1", 3, 60, t0 + Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(decision, RateDecision::Rejected { retry_after_secs: 50 });
    }

    #[tokio::test]
    async fn test_retry_after_bounds() {
        let limiter = limiter();
        let t0 = Utc::now();
        limiter.hit_at(JOBS_CONTROL, "t1", 1, 30, t0).await.unwrap();

        let early = limiter.hit_at(JOBS_CONTROL, "t1", 1, 30, t0).await.unwrap();
        assert_eq!(early, RateDecision::Rejected { retry_after_secs: 30 });

        let late = limiter
            .hit_at(JOBS_CONTROL, "t1", 1, 30, t0 + Duration::milliseconds(29_900))
            .await
            .unwrap();
        assert_eq!(late, RateDecision::Rejected { retry_after_secs: 1 });
    }

    #[tokio::test]
    async fn test_rejection_does_not_count() {
        let t0 = Utc::now();
        let (counter, _) = apply_fixed_window(None, "s", "i", 1, 60, t0);
        let (after, decision) = apply_fixed_window(Some(counter.clone()), "s", "i", 1, 60, t0);
        assert!(!decision.is_allowed());
        assert_eq!(after.count, counter.count);
    }

    #[tokio::test]
    async fn test_window_elapses() {
        let limiter = limiter();
        let t0 = Utc::now();
        limiter.hit_at(JOBS_CREATE, "t1", 1, 60, t0).await.unwrap();

        let decision = limiter
            .hit_at(JOBS_CREATE, "t1", 1, 60, t0 + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(decision, RateDecision::Allowed { count: 1 });
    }

    #[tokio::test]
    async fn test_scopes_and_identities_are_independent() {
        let limiter = limiter();
        let t0 = Utc::now();
        limiter.hit_at(JOBS_CREATE, "t1", 1, 60, t0).await.unwrap();

        assert!(limiter
            .hit_at(WEBHOOKS_MANAGE, "t1", 1, 60, t0)
            .await
            .unwrap()
            .is_allowed());
        assert!(limiter
            .hit_at(JOBS_CREATE, "t2", 1, 60, t0)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn test_check_maps_to_rate_limited() {
        let limiter = limiter();
        let policy = RatePolicy::new(JOBS_CREATE, 1, 60);
        limiter.check(&policy, "t1").await.unwrap();

        let err = limiter.check(&policy, "t1").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { retry_after_secs } if retry_after_secs <= 60));
    }

    #[tokio::test]
    async fn test_zero_limit_rejected() {
        let err = limiter().hit(JOBS_CREATE, "t1", 0, 60).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
