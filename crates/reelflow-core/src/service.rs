//! Job orchestration service.
//!
//! Every mutation reads the job, plans the transition, and commits the job
//! together with the derived resource status under a version check. A lost
//! race re-reads and re-plans. After a commit the snapshot goes to the event
//! broker, webhook deliveries are created, and jobs that need a worker are
//! handed to the queue. None of those follow-ups can fail the transition.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use reelflow_models::{
    Job, JobId, JobStatus, NewJob, ResourceEffect, ResourceRef, ResourceState, TenantId,
    WebhookEventType,
};
use reelflow_queue::{TaskPayload, TaskQueue};

use crate::broker::EventBroker;
use crate::error::{CoreError, CoreResult};
use crate::metrics;
use crate::propagation::{derive_effect, events_for};
use crate::state_machine::{plan, Command, Plan};
use crate::store::{JobFilter, JobStore};
use crate::webhooks::WebhookDispatcher;

/// Attempts at a compare-and-swap write before giving up with `Conflict`.
pub const MAX_TRANSITION_ATTEMPTS: u32 = 5;

/// Worker-reported update.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvanceRequest {
    pub status: JobStatus,
    pub progress: Option<f64>,
    pub message: Option<String>,
}

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn TaskQueue>,
    broker: Arc<EventBroker>,
    webhooks: Arc<WebhookDispatcher>,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn TaskQueue>,
        broker: Arc<EventBroker>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        Self {
            store,
            queue,
            broker,
            webhooks,
        }
    }

    pub fn broker(&self) -> &Arc<EventBroker> {
        &self.broker
    }

    /// Create a QUEUED job and hand it to the worker pool.
    pub async fn create(&self, new: NewJob) -> CoreResult<Job> {
        let job = Job::create(new)?;
        self.store.insert_job(&job).await?;

        info!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            job_type = %job.job_type,
            "Created job"
        );
        metrics::record_transition(job.job_type.as_str(), job.status.as_str());

        self.notify(&job, None).await;
        self.enqueue(&job).await;
        Ok(job)
    }

    pub async fn get(&self, tenant_id: &TenantId, id: &JobId) -> CoreResult<Job> {
        self.store
            .get_job(tenant_id, id)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("job {}", id)))
    }

    pub async fn list(&self, tenant_id: &TenantId, filter: &JobFilter) -> CoreResult<Vec<Job>> {
        Ok(self.store.list_jobs(tenant_id, filter).await?)
    }

    /// Apply a worker update. On a terminal job this returns the current row
    /// and publishes nothing.
    pub async fn advance(
        &self,
        tenant_id: &TenantId,
        id: &JobId,
        request: AdvanceRequest,
    ) -> CoreResult<Job> {
        let command = Command::Advance {
            status: request.status,
            progress: request.progress,
            message: request.message,
        };
        self.transition(tenant_id, id, command).await
    }

    pub async fn cancel(
        &self,
        tenant_id: &TenantId,
        id: &JobId,
        reason: Option<String>,
    ) -> CoreResult<Job> {
        self.transition(tenant_id, id, Command::Cancel { reason }).await
    }

    pub async fn pause(&self, tenant_id: &TenantId, id: &JobId) -> CoreResult<Job> {
        self.transition(tenant_id, id, Command::Pause).await
    }

    pub async fn resume(&self, tenant_id: &TenantId, id: &JobId) -> CoreResult<Job> {
        self.transition(tenant_id, id, Command::Resume).await
    }

    pub async fn retry(&self, tenant_id: &TenantId, id: &JobId) -> CoreResult<Job> {
        self.transition(tenant_id, id, Command::Retry).await
    }

    /// Derived status of a resource.
    pub async fn resource(
        &self,
        tenant_id: &TenantId,
        resource: &ResourceRef,
    ) -> CoreResult<ResourceState> {
        self.store
            .get_resource(tenant_id, resource)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("resource {}", resource)))
    }

    async fn transition(
        &self,
        tenant_id: &TenantId,
        id: &JobId,
        command: Command,
    ) -> CoreResult<Job> {
        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.get(tenant_id, id).await?;

            let next = match plan(&current, &command, Utc::now())? {
                Plan::Apply(next) => next,
                Plan::Noop => {
                    debug!(
                        job_id = %id,
                        status = %current.status,
                        command = command.name(),
                        "Ignoring update to terminal job"
                    );
                    metrics::record_noop_advance(current.job_type.as_str());
                    return Ok(current);
                }
            };

            let effect = derive_effect(&next);
            match self
                .store
                .commit_transition(&next, current.version, effect.as_ref())
                .await
            {
                Ok(_) => {
                    info!(
                        job_id = %next.id,
                        tenant_id = %next.tenant_id,
                        job_type = %next.job_type,
                        from = %current.status,
                        status = %next.status,
                        progress = next.progress,
                        "Job transitioned"
                    );
                    metrics::record_transition(next.job_type.as_str(), next.status.as_str());

                    self.notify(&next, effect.as_ref()).await;
                    if command.requeues() {
                        self.enqueue(&next).await;
                    }
                    return Ok(next);
                }
                Err(e) if e.is_version_conflict() => {
                    debug!(
                        job_id = %id,
                        attempt = attempt,
                        "Concurrent job update, re-reading"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            job_id = %id,
            attempts = MAX_TRANSITION_ATTEMPTS,
            "Job update kept losing to concurrent writers"
        );
        Err(CoreError::conflict(format!(
            "job {} is being updated concurrently",
            id
        )))
    }

    /// Publish a committed snapshot to live subscribers and webhooks.
    async fn notify(&self, job: &Job, effect: Option<&ResourceEffect>) {
        self.broker.publish(job);

        for event in events_for(job) {
            let data = match event {
                WebhookEventType::JobUpdated => json!({ "job": job }),
                _ => json!({ "job": job, "resource": effect }),
            };
            if let Err(e) = self.webhooks.publish(&job.tenant_id, event, data).await {
                warn!(
                    job_id = %job.id,
                    event_type = %event,
                    error = %e,
                    "Failed to create webhook deliveries"
                );
            }
        }
    }

    async fn enqueue(&self, job: &Job) {
        let task_name = job.job_type.task_name();
        match self
            .queue
            .enqueue(&task_name, TaskPayload::for_job(job))
            .await
        {
            Ok(message_id) => debug!(
                job_id = %job.id,
                task = %task_name,
                message_id = %message_id,
                "Job handed to worker pool"
            ),
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    task = %task_name,
                    error = %e,
                    "Failed to enqueue job"
                );
                metrics::record_enqueue_failure(&task_name);
            }
        }
    }
}
