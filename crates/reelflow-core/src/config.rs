//! Guard configuration.

use crate::rate_limit::{RatePolicy, JOBS_CONTROL, JOBS_CREATE, WEBHOOKS_MANAGE};
use crate::store::DEFAULT_IDEMPOTENCY_TTL_SECS;

/// Idempotency and rate limit settings.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Lifetime of idempotency records in seconds
    pub idempotency_ttl_secs: u64,
    pub jobs_create: RatePolicy,
    pub jobs_control: RatePolicy,
    pub webhooks_manage: RatePolicy,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            jobs_create: RatePolicy::new(JOBS_CREATE, 30, 60),
            jobs_control: RatePolicy::new(JOBS_CONTROL, 120, 60),
            webhooks_manage: RatePolicy::new(WEBHOOKS_MANAGE, 20, 60),
        }
    }
}

impl GuardConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let window = env_parse("RATE_LIMIT_WINDOW_SECS").unwrap_or(60u64).max(1);

        Self {
            idempotency_ttl_secs: env_parse("IDEMPOTENCY_TTL_SECS")
                .unwrap_or(defaults.idempotency_ttl_secs),
            jobs_create: RatePolicy::new(
                JOBS_CREATE,
                env_parse("RATE_LIMIT_JOBS_CREATE")
                    .unwrap_or(defaults.jobs_create.limit)
                    .max(1),
                window,
            ),
            jobs_control: RatePolicy::new(
                JOBS_CONTROL,
                env_parse("RATE_LIMIT_JOBS_CONTROL")
                    .unwrap_or(defaults.jobs_control.limit)
                    .max(1),
                window,
            ),
            webhooks_manage: RatePolicy::new(
                WEBHOOKS_MANAGE,
                env_parse("RATE_LIMIT_WEBHOOKS")
                    .unwrap_or(defaults.webhooks_manage.limit)
                    .max(1),
                window,
            ),
        }
    }

    /// Policy by scope name.
    pub fn policy(&self, scope: &str) -> Option<&RatePolicy> {
        [&self.jobs_create, &self.jobs_control, &self.webhooks_manage]
            .into_iter()
            .find(|p| p.scope == scope)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
