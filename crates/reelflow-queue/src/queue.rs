//! Task queue on Redis Streams.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamMaxlen, StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::task::{QueuedTask, TaskPayload};

/// Enqueue seam used by the orchestration core.
///
/// Implementations hand the task to a worker pool and return a message id.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task_name: &str, payload: TaskPayload) -> QueueResult<String>;
}

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for tasks
    pub stream_name: String,
    /// Consumer group read by worker pools
    pub consumer_group: String,
    /// Approximate stream length cap
    pub max_len: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "reelflow:tasks".to_string(),
            consumer_group: "reelflow:workers".to_string(),
            max_len: 100_000,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            max_len: std::env::var("QUEUE_MAXLEN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_len),
        }
    }
}

/// Field holding the serialized `QueuedTask` on each stream entry.
const TASK_FIELD: &str = "task";
/// Plain task name next to the payload, for `XRANGE` inspection.
const NAME_FIELD: &str = "name";

/// Redis Streams task queue.
///
/// Producers `XADD` onto one capped stream; worker pools read it through a
/// consumer group and acknowledge (and delete) each task when done.
pub struct RedisTaskQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisTaskQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Create the stream and its consumer group. Safe to call repeatedly.
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let QueueConfig {
            stream_name,
            consumer_group,
            ..
        } = &self.config;

        let created: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(stream_name, consumer_group, "$")
            .await;
        match created {
            Ok(()) => info!(stream = %stream_name, group = %consumer_group, "Created consumer group"),
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Entries currently on the stream (delivered but unacked included).
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    /// Read up to `count` new tasks for `consumer_name`, waiting at most
    /// `block_ms`. Entries that do not decode are acked and skipped.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<(String, QueuedTask)>> {
        let mut conn = self.connection().await?;
        let options = StreamReadOptions::default()
            .group(&self.config.consumer_group, consumer_name)
            .count(count)
            .block(block_ms as usize);

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[&self.config.stream_name], &[">"], &options)
            .await?;

        let entries = reply
            .into_iter()
            .flat_map(|reply| reply.keys)
            .flat_map(|key| key.ids);

        let mut tasks = Vec::new();
        for entry in entries {
            let decoded = entry
                .get::<Vec<u8>>(TASK_FIELD)
                .ok_or_else(|| format!("missing {} field", TASK_FIELD))
                .and_then(|raw| serde_json::from_slice::<QueuedTask>(&raw).map_err(|e| e.to_string()));
            match decoded {
                Ok(task) => tasks.push((entry.id, task)),
                Err(reason) => {
                    warn!(message_id = %entry.id, reason = %reason, "Dropping malformed task");
                    self.ack(&entry.id).await?;
                }
            }
        }
        Ok(tasks)
    }

    /// Acknowledge a consumed task and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;
        let stream = &self.config.stream_name;

        let _: u64 = conn
            .xack(stream, &self.config.consumer_group, &[message_id])
            .await?;
        let _: u64 = conn.xdel(stream, &[message_id]).await?;

        debug!(message_id = message_id, "Acknowledged task");
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task_name: &str, payload: TaskPayload) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let job_id = payload.job_id.clone();
        let body = serde_json::to_string(&QueuedTask::new(task_name, payload))?;

        let message_id: String = conn
            .xadd_maxlen(
                &self.config.stream_name,
                StreamMaxlen::Approx(self.config.max_len as usize),
                "*",
                &[(TASK_FIELD, body.as_str()), (NAME_FIELD, task_name)],
            )
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(
            task = task_name,
            job_id = %job_id,
            message_id = %message_id,
            "Enqueued task"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "reelflow:tasks");
        assert_eq!(config.consumer_group, "reelflow:workers");
        assert_eq!(config.max_len, 100_000);
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let config = QueueConfig {
            redis_url: "not a url".to_string(),
            ..QueueConfig::default()
        };
        assert!(matches!(
            RedisTaskQueue::new(config),
            Err(QueueError::ConnectionFailed(_))
        ));
    }
}
