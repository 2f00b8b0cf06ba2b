//! Pipeline task queue.
//!
//! This crate provides:
//! - The `TaskQueue` seam the orchestration core enqueues through
//! - A Redis Streams implementation consumed by worker pools
//! - An in-process implementation for tests and local runs

pub mod error;
pub mod memory;
pub mod queue;
pub mod task;

pub use error::{QueueError, QueueResult};
pub use memory::InMemoryTaskQueue;
pub use queue::{QueueConfig, RedisTaskQueue, TaskQueue};
pub use task::{QueuedTask, TaskPayload};
