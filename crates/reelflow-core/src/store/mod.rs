//! Persistence seams.
//!
//! Every read is tenant-scoped except the delivery lookups used by the
//! webhook transport, which run under the worker shared secret.

mod memory;
mod redis_backend;

pub use self::memory::MemoryStore;
pub use self::redis_backend::{
    RedisIdempotencyStore, RedisRateLimitStore, DEFAULT_IDEMPOTENCY_TTL_SECS,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use reelflow_models::{
    DeliveryId, EndpointId, IdempotencyRecord, Job, JobId, JobStatus, ProjectId, ResourceEffect,
    ResourceRef, ResourceState, TenantId, WebhookDelivery, WebhookEndpoint,
};

use crate::error::StoreResult;
use crate::rate_limit::RateDecision;

/// Filter for listing a tenant's jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub project_id: Option<ProjectId>,
    pub status: Option<JobStatus>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        self.project_id
            .as_ref()
            .map_or(true, |p| &job.refs.project_id == p)
            && self.status.map_or(true, |s| job.status == s)
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> StoreResult<()>;

    async fn get_job(&self, tenant_id: &TenantId, id: &JobId) -> StoreResult<Option<Job>>;

    /// Newest first.
    async fn list_jobs(&self, tenant_id: &TenantId, filter: &JobFilter) -> StoreResult<Vec<Job>>;

    /// Write `job` if the stored row is still at `expected_version`, and apply
    /// `effect` to its resource in the same atomic step.
    ///
    /// Returns `StoreError::VersionConflict` when another writer got there first.
    async fn commit_transition(
        &self,
        job: &Job,
        expected_version: u64,
        effect: Option<&ResourceEffect>,
    ) -> StoreResult<Option<ResourceState>>;

    async fn get_resource(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceRef,
    ) -> StoreResult<Option<ResourceState>>;
}

#[async_trait]
pub trait WebhookStore: Send + Sync {
    async fn insert_endpoint(&self, endpoint: &WebhookEndpoint) -> StoreResult<()>;

    async fn get_endpoint(&self, id: &EndpointId) -> StoreResult<Option<WebhookEndpoint>>;

    async fn list_endpoints(&self, tenant_id: &TenantId) -> StoreResult<Vec<WebhookEndpoint>>;

    /// Mark an endpoint inactive. `None` if it does not belong to the tenant.
    async fn deactivate_endpoint(
        &self,
        tenant_id: &TenantId,
        id: &EndpointId,
    ) -> StoreResult<Option<WebhookEndpoint>>;

    /// Insert every delivery of one event in a single call.
    async fn insert_deliveries(&self, deliveries: &[WebhookDelivery]) -> StoreResult<()>;

    async fn get_delivery(&self, id: &DeliveryId) -> StoreResult<Option<WebhookDelivery>>;

    async fn update_delivery(&self, delivery: &WebhookDelivery) -> StoreResult<()>;

    /// Oldest pending deliveries first.
    async fn pending_deliveries(&self, limit: usize) -> StoreResult<Vec<WebhookDelivery>>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get_record(
        &self,
        tenant_id: &TenantId,
        key: &str,
    ) -> StoreResult<Option<IdempotencyRecord>>;

    /// Insert unless a record already exists. Returns whether it was inserted.
    async fn insert_record(&self, record: &IdempotencyRecord) -> StoreResult<bool>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Count one request against the fixed window of (scope, identity).
    async fn hit(
        &self,
        scope: &str,
        identity: &str,
        limit: u32,
        window_secs: u64,
        now: DateTime<Utc>,
    ) -> StoreResult<RateDecision>;
}
