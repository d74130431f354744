//! Dispatch façade: how request handlers schedule notifications.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{DispatchError, QueueError};
use crate::job::{Job, JobId};
use crate::queue::JobQueue;

/// Hands jobs to the queue and returns without waiting for them to run.
///
/// The only wait is the enqueue round trip, bounded by `enqueue_timeout`.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<dyn JobQueue>,
    enqueue_timeout: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, enqueue_timeout: Duration) -> Self {
        Self {
            queue,
            enqueue_timeout,
        }
    }

    pub async fn enqueue_notification(
        &self,
        subject: &str,
        recipient: &str,
        body: &str,
    ) -> Result<JobId, DispatchError> {
        self.enqueue(Job::new(subject, recipient, body)).await
    }

    pub async fn enqueue(&self, job: Job) -> Result<JobId, DispatchError> {
        let enqueued = tokio::time::timeout(self.enqueue_timeout, self.queue.enqueue(&job))
            .await
            .unwrap_or(Err(QueueError::Timeout(self.enqueue_timeout)));
        match enqueued {
            Ok(id) => {
                debug!(job_id = %id, recipient = %job.recipient, "notification scheduled");
                Ok(id)
            }
            Err(err) => {
                warn!(recipient = %job.recipient, error = %err, "failed to schedule notification");
                Err(DispatchError::QueueUnavailable(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::QueueResult;
    use crate::job::{DeadLetter, Delivery};
    use crate::queue::{InMemoryJobQueue, QueueSettings, QueueStats};

    /// A broker that never answers.
    struct Stalled;

    #[async_trait]
    impl JobQueue for Stalled {
        async fn enqueue(&self, _job: &Job) -> QueueResult<JobId> {
            std::future::pending().await
        }
        async fn dequeue(&self, _wait: Duration) -> QueueResult<Option<Delivery>> {
            Ok(None)
        }
        async fn ack(&self, _delivery: &Delivery) -> QueueResult<bool> {
            Ok(false)
        }
        async fn retry(&self, _delivery: &Delivery, _delay: Duration, _error: &str) -> QueueResult<bool> {
            Ok(false)
        }
        async fn dead_letter(&self, _delivery: &Delivery, _error: &str) -> QueueResult<bool> {
            Ok(false)
        }
        async fn dead_letters(&self, _limit: usize) -> QueueResult<Vec<DeadLetter>> {
            Ok(Vec::new())
        }
        async fn requeue_dead(&self, _id: &JobId) -> QueueResult<bool> {
            Ok(false)
        }
        async fn stats(&self) -> QueueResult<QueueStats> {
            Ok(QueueStats::default())
        }
    }

    #[tokio::test]
    async fn enqueue_returns_before_anything_is_sent() {
        let queue = Arc::new(InMemoryJobQueue::new(QueueSettings::new("test")));
        let dispatcher = Dispatcher::new(queue.clone(), Duration::from_secs(1));

        dispatcher
            .enqueue_notification("Receta Agregada con Éxito", "a@b.com", "Nombre: Tarta")
            .await
            .unwrap();
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_broker_is_reported_as_unavailable() {
        let dispatcher = Dispatcher::new(Arc::new(Stalled), Duration::from_millis(200));
        let err = dispatcher
            .enqueue_notification("s", "a@b.com", "b")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::QueueUnavailable(QueueError::Timeout(_))
        ));
    }
}
