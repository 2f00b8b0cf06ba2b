//! Task payloads handed to worker pools.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use reelflow_models::{Job, JobId, TenantId};

/// Arguments of a queued pipeline task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    /// Task-specific arguments (resource references, retry attempt)
    #[serde(default)]
    pub extra_args: serde_json::Value,
}

impl TaskPayload {
    /// Payload for a job: carries its resource references and attempt number.
    pub fn for_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            tenant_id: job.tenant_id.clone(),
            extra_args: serde_json::json!({
                "job_type": job.job_type,
                "refs": job.refs,
                "attempt": job.retry_count + 1,
            }),
        }
    }
}

/// A task as stored on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_name: String,
    pub payload: TaskPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(task_name: impl Into<String>, payload: TaskPayload) -> Self {
        Self {
            task_name: task_name.into(),
            payload,
            enqueued_at: Utc::now(),
        }
    }
}
