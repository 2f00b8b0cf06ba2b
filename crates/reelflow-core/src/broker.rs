//! In-process pub/sub of job snapshots keyed by job id.
//!
//! Each job id owns a bounded broadcast ring. Publishing never blocks: a
//! subscriber that falls more than `capacity` snapshots behind skips the
//! oldest ones, receives a `Lagged` marker with the number skipped, and
//! continues from the oldest retained snapshot. A channel is removed when
//! its last subscription is dropped.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use reelflow_models::{Job, JobId, LiveMessage};

use crate::metrics;

/// Default per-job ring size.
pub const DEFAULT_CAPACITY: usize = 64;

type Channels = Mutex<HashMap<JobId, broadcast::Sender<Job>>>;

fn lock(channels: &Channels) -> std::sync::MutexGuard<'_, HashMap<JobId, broadcast::Sender<Job>>> {
    match channels.lock() {
        Ok(channels) => channels,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Live stream for one job. Field order matters: the receiver inside
/// `updates` is dropped before `release` checks the subscriber count.
struct Subscription {
    updates: BoxStream<'static, LiveMessage>,
    release: Release,
}

impl Stream for Subscription {
    type Item = LiveMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.updates.poll_next_unpin(cx)
    }
}

struct Release {
    channels: Weak<Channels>,
    job_id: JobId,
}

impl Drop for Release {
    fn drop(&mut self) {
        let Some(channels) = self.channels.upgrade() else {
            return;
        };
        let mut channels = lock(&channels);
        let abandoned = channels
            .get(&self.job_id)
            .is_some_and(|sender| sender.receiver_count() == 0);
        if abandoned {
            channels.remove(&self.job_id);
            debug!(job_id = %self.job_id, "Released channel after last subscriber");
        }
    }
}

pub struct EventBroker {
    channels: Arc<Channels>,
    capacity: usize,
}

impl Default for EventBroker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBroker {
    /// `capacity` is raised to at least 1. The ring may round it up to a
    /// power of two.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stream of updates for one job, starting with the next publish.
    ///
    /// Dropping the stream unsubscribes.
    pub fn subscribe(&self, job_id: &JobId) -> BoxStream<'static, LiveMessage> {
        let receiver = lock(&self.channels)
            .entry(job_id.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        let release = Release {
            channels: Arc::downgrade(&self.channels),
            job_id: job_id.clone(),
        };
        let job_id = job_id.clone();
        let updates = stream::unfold(receiver, move |mut receiver| {
            let job_id = job_id.clone();
            async move {
                match receiver.recv().await {
                    Ok(job) => Some((LiveMessage::update(job), receiver)),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(job_id = %job_id, skipped = skipped, "Live subscriber lagged");
                        metrics::record_broker_lagged(skipped);
                        Some((LiveMessage::Lagged { skipped }, receiver))
                    }
                    Err(RecvError::Closed) => None,
                }
            }
        })
        .boxed();

        Subscription { updates, release }.boxed()
    }

    /// Push a snapshot to every current subscriber of the job. Returns the
    /// number of subscribers reached.
    pub fn publish(&self, job: &Job) -> usize {
        let mut channels = lock(&self.channels);

        let Some(sender) = channels.get(&job.id) else {
            return 0;
        };

        match sender.send(job.clone()) {
            Ok(reached) => reached,
            Err(_) => {
                debug!(job_id = %job.id, "Dropping channel without subscribers");
                channels.remove(&job.id);
                0
            }
        }
    }

    /// Remove every channel without subscribers.
    pub fn prune(&self) -> usize {
        let mut channels = lock(&self.channels);
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub fn subscriber_count(&self, job_id: &JobId) -> usize {
        lock(&self.channels)
            .get(job_id)
            .map_or(0, |sender| sender.receiver_count())
    }

    pub fn channel_count(&self) -> usize {
        lock(&self.channels).len()
    }
}
