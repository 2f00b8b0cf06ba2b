//! In-process store implementing every store trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use reelflow_models::{
    DeliveryId, DeliveryStatus, EndpointId, IdempotencyRecord, Job, JobId, RateLimitCounter,
    ResourceEffect, ResourceRef, ResourceState, TenantId, WebhookDelivery, WebhookEndpoint,
};

use super::{
    IdempotencyStore, JobFilter, JobStore, RateLimitStore, WebhookStore,
    DEFAULT_IDEMPOTENCY_TTL_SECS,
};
use crate::error::{StoreError, StoreResult};
use crate::rate_limit::{apply_fixed_window, RateDecision};

/// Guard entries kept before expired ones are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// A counter and the window it was opened for.
struct CounterSlot {
    counter: RateLimitCounter,
    window_secs: u64,
}

impl CounterSlot {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.counter.elapsed_secs(now) >= self.window_secs as i64
    }
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, Job>,
    resources: HashMap<(TenantId, ResourceRef), ResourceState>,
    endpoints: HashMap<EndpointId, WebhookEndpoint>,
    deliveries: HashMap<DeliveryId, WebhookDelivery>,
    idempotency: HashMap<(TenantId, String), IdempotencyRecord>,
    counters: HashMap<(String, String), CounterSlot>,
}

/// All collections behind one lock, so a job write and its resource write
/// land together.
///
/// Idempotency records expire after the configured TTL and rate-limit
/// counters after their window, matching the Redis guard backends.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    idempotency_ttl: chrono::Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_idempotency_ttl(DEFAULT_IDEMPOTENCY_TTL_SECS)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ttl_secs` is raised to at least 1.
    pub fn with_idempotency_ttl(ttl_secs: u64) -> Self {
        let secs = i64::try_from(ttl_secs.max(1))
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1_000);
        Self {
            inner: RwLock::new(Inner::default()),
            idempotency_ttl: chrono::Duration::seconds(secs),
        }
    }

    fn record_expired(&self, record: &IdempotencyRecord, now: DateTime<Utc>) -> bool {
        now - record.created_at >= self.idempotency_ttl
    }

    /// Live guard entries, for tests and diagnostics.
    pub async fn guard_entries(&self) -> (usize, usize) {
        let inner = self.inner.read().await;
        (inner.idempotency.len(), inner.counters.len())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(format!("job {}", job.id)));
        }
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, tenant_id: &TenantId, id: &JobId) -> StoreResult<Option<Job>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .get(id)
            .filter(|job| &job.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_jobs(&self, tenant_id: &TenantId, filter: &JobFilter) -> StoreResult<Vec<Job>> {
        let inner = self.inner.read().await;
        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|job| &job.tenant_id == tenant_id && filter.matches(job))
            .cloned()
            .collect();

        jobs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn commit_transition(
        &self,
        job: &Job,
        expected_version: u64,
        effect: Option<&ResourceEffect>,
    ) -> StoreResult<Option<ResourceState>> {
        let mut inner = self.inner.write().await;

        let stored = inner
            .jobs
            .get(&job.id)
            .filter(|stored| stored.tenant_id == job.tenant_id)
            .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id)))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict(format!(
                "job {} is at version {}, expected {}",
                job.id, stored.version, expected_version
            )));
        }

        inner.jobs.insert(job.id.clone(), job.clone());

        let Some(effect) = effect else {
            return Ok(None);
        };
        let now = job.updated_at;
        let state = inner
            .resources
            .entry((job.tenant_id.clone(), effect.target.clone()))
            .or_insert_with(|| ResourceState::new(job.tenant_id.clone(), effect.target.clone(), now));
        state.apply(effect, now);
        Ok(Some(state.clone()))
    }

    async fn get_resource(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceRef,
    ) -> StoreResult<Option<ResourceState>> {
        let inner = self.inner.read().await;
        Ok(inner
            .resources
            .get(&(tenant_id.clone(), resource.clone()))
            .cloned())
    }
}

#[async_trait]
impl WebhookStore for MemoryStore {
    async fn insert_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.endpoints.insert(endpoint.id.clone(), endpoint.clone());
        Ok(())
    }

    async fn get_endpoint(&self, id: &EndpointId) -> StoreResult<Option<WebhookEndpoint>> {
        Ok(self.inner.read().await.endpoints.get(id).cloned())
    }

    async fn list_endpoints(&self, tenant_id: &TenantId) -> StoreResult<Vec<WebhookEndpoint>> {
        let inner = self.inner.read().await;
        let mut endpoints: Vec<WebhookEndpoint> = inner
            .endpoints
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(endpoints)
    }

    async fn deactivate_endpoint(
        &self,
        tenant_id: &TenantId,
        id: &EndpointId,
    ) -> StoreResult<Option<WebhookEndpoint>> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .endpoints
            .get_mut(id)
            .filter(|e| &e.tenant_id == tenant_id)
            .map(|e| {
                e.active = false;
                e.clone()
            }))
    }

    async fn insert_deliveries(&self, deliveries: &[WebhookDelivery]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for delivery in deliveries {
            inner.deliveries.insert(delivery.id.clone(), delivery.clone());
        }
        Ok(())
    }

    async fn get_delivery(&self, id: &DeliveryId) -> StoreResult<Option<WebhookDelivery>> {
        Ok(self.inner.read().await.deliveries.get(id).cloned())
    }

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        match inner.deliveries.get_mut(&delivery.id) {
            Some(stored) => {
                *stored = delivery.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("delivery {}", delivery.id))),
        }
    }

    async fn pending_deliveries(&self, limit: usize) -> StoreResult<Vec<WebhookDelivery>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<WebhookDelivery> = inner
            .deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn get_record(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> StoreResult<Option<IdempotencyRecord>> {
        let key = (tenant_id.clone(), key.to_string());
        let now = Utc::now();
        {
            let inner = self.inner.read().await;
            match inner.idempotency.get(&key) {
                None => return Ok(None),
                Some(record) if !self.record_expired(record, now) => {
                    return Ok(Some(record.clone()))
                }
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().await;
        let expired = inner
            .idempotency
            .get(&key)
            .is_some_and(|record| self.record_expired(record, now));
        if expired {
            inner.idempotency.remove(&key);
            return Ok(None);
        }
        Ok(inner.idempotency.get(&key).cloned())
    }

    async fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        if inner.idempotency.len() >= SWEEP_THRESHOLD {
            inner
                .idempotency
                .retain(|_, stored| !self.record_expired(stored, now));
        }

        let key = (record.tenant_id.clone(), record.key.clone());
        let taken = inner
            .idempotency
            .get(&key)
            .is_some_and(|stored| !self.record_expired(stored, now));
        if taken {
            return Ok(false);
        }
        inner.idempotency.insert(key, record.clone());
        Ok(true)
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn hit(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<RateDecision> {
        let mut inner = self.inner.write().await;
        if inner.counters.len() >= SWEEP_THRESHOLD {
            inner.counters.retain(|_, slot| !slot.is_expired(now));
        }

        let key = (scope.to_string(), identity.to_string());
        let existing = inner.counters.remove(&key).map(|slot| slot.counter);
        let (counter, decision) =
            apply_fixed_window(existing, scope, identity, limit, window_secs, now);
        inner.counters.insert(
            key,
            CounterSlot {
                counter,
                window_secs,
            },
        );
        Ok(decision)
    }
}
