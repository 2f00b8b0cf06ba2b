//! Application state.

use std::sync::Arc;

use tracing::info;

use reelflow_core::{
    EventBroker, IdempotencyGuard, IdempotencyStore, JobService, MemoryStore, RateLimitStore,
    RateLimiter, RedisIdempotencyStore, RedisRateLimitStore, WebhookDispatcher,
};
use reelflow_queue::{InMemoryTaskQueue, QueueConfig, RedisTaskQueue, TaskQueue};

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobService,
    pub webhooks: Arc<WebhookDispatcher>,
    pub idempotency: IdempotencyGuard,
    pub rate_limiter: RateLimiter,
    pub broker: Arc<EventBroker>,
    /// Set when the queue runs on Redis; used by the readiness check.
    pub redis_queue: Option<Arc<RedisTaskQueue>>,
}

impl AppState {
    /// Create new application state.
    ///
    /// Jobs, resources and webhooks live in the in-memory store. With
    /// `REDIS_URL` set, the task queue and the request guards use Redis.
    pub async fn new(config: ApiConfig) -> ApiResult<Self> {
        let store = Arc::new(MemoryStore::with_idempotency_ttl(
            config.guards.idempotency_ttl_secs,
        ));

        let Some(redis_url) = config.redis_url.clone() else {
            info!("REDIS_URL not set, using in-memory queue and guards");
            let queue = Arc::new(InMemoryTaskQueue::new());
            return Ok(Self::with_backends(config, store.clone(), store.clone(), store, queue, None));
        };

        let queue = RedisTaskQueue::new(QueueConfig {
            redis_url: redis_url.clone(),
            ..QueueConfig::from_env()
        })?;
        queue.init().await?;
        let queue = Arc::new(queue);

        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| ApiError::internal(format!("Invalid REDIS_URL: {}", e)))?;
        let idempotency = Arc::new(RedisIdempotencyStore::new(
            client.clone(),
            config.guards.idempotency_ttl_secs,
        ));
        let rate_limits = Arc::new(RedisRateLimitStore::new(client));

        info!(stream = %queue.config().stream_name, "Using Redis queue and guards");
        Ok(Self::with_backends(
            config,
            store,
            idempotency,
            rate_limits,
            queue.clone(),
            Some(queue),
        ))
    }

    /// State over the in-memory store and queue.
    pub fn in_memory(config: ApiConfig, queue: Arc<dyn TaskQueue>) -> Self {
        let store = Arc::new(MemoryStore::with_idempotency_ttl(
            config.guards.idempotency_ttl_secs,
        ));
        Self::with_backends(config, store.clone(), store.clone(), store, queue, None)
    }

    fn with_backends(
        config: ApiConfig,
        store: Arc<MemoryStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        queue: Arc<dyn TaskQueue>,
        redis_queue: Option<Arc<RedisTaskQueue>>,
    ) -> Self {
        let broker = Arc::new(EventBroker::new(config.broker_capacity));
        let webhooks = Arc::new(WebhookDispatcher::new(store.clone()));
        let jobs = JobService::new(store, queue, broker.clone(), webhooks.clone());

        Self {
            config,
            jobs,
            webhooks,
            idempotency: IdempotencyGuard::new(idempotency),
            rate_limiter: RateLimiter::new(rate_limits),
            broker,
            redis_queue,
        }
    }
}
