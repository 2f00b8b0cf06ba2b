//! In-process task queue.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{QueueError, QueueResult};
use crate::queue::TaskQueue;
use crate::task::{QueuedTask, TaskPayload};

/// Records enqueued tasks in memory. Can be switched to fail every enqueue.
#[derive(Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<Vec<QueuedTask>>,
    failing: Mutex<bool>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// A queue whose enqueue always fails.
    pub fn failing() -> Self {
        let queue = Self::default();
        queue.set_failing(true);
        queue
    }

    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.failing.lock() {
            *flag = failing;
        }
    }

    /// Snapshot of everything enqueued so far.
    pub fn tasks(&self) -> Vec<QueuedTask> {
        self.tasks.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task_name: &str, payload: TaskPayload) -> QueueResult<String> {
        if self.failing.lock().map(|f| *f).unwrap_or(false) {
            return Err(QueueError::enqueue_failed("queue unavailable"));
        }

        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| QueueError::enqueue_failed("queue lock poisoned"))?;
        tasks.push(QueuedTask::new(task_name, payload));
        Ok(format!("mem-{}", tasks.len()))
    }
}
