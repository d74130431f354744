//! At-least-once job queue with leases.
//!
//! ## Lifecycle
//!
//! - `enqueue` stores the job as pending
//! - `dequeue` leases the oldest ready job to one caller for the visibility
//!   timeout; while leased it is invisible to other callers
//! - the lease holder ends the delivery with `ack`, `retry` or `dead_letter`
//! - a lease that expires without any of those puts the job back in the
//!   pending set, and the next delivery carries a higher `attempt`
//!
//! Lease-bound operations return `false` when the lease was no longer held,
//! which means the job has already been (or will be) delivered again.

mod memory;
mod redis_queue;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::QueueResult;
use crate::job::{DeadLetter, Delivery, Job, JobId};

pub use self::memory::InMemoryJobQueue;
pub use self::redis_queue::RedisJobQueue;

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub name: String,
    pub visibility_timeout: Duration,
    /// How often an idle `dequeue` re-checks for work.
    pub poll_interval: Duration,
}

impl QueueSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visibility_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub delayed: usize,
    pub dead: usize,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &Job) -> QueueResult<JobId>;

    /// Waits up to `wait` for a job. `Ok(None)` means nothing became ready.
    async fn dequeue(&self, wait: Duration) -> QueueResult<Option<Delivery>>;

    /// Removes the job for good.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<bool>;

    /// Releases the lease and makes the job ready again after `delay`.
    async fn retry(&self, delivery: &Delivery, delay: Duration, error: &str) -> QueueResult<bool>;

    /// Moves the job to the dead-letter list.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<bool>;

    /// Most recent dead letters first.
    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<DeadLetter>>;

    /// Puts a dead letter back in the pending set with a fresh attempt count.
    async fn requeue_dead(&self, id: &JobId) -> QueueResult<bool>;

    async fn stats(&self) -> QueueResult<QueueStats>;
}
