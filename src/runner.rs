use std::process;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::error::{QueueResult, TransportError};
use crate::job::Delivery;
use crate::mailer::MailTransport;
use crate::queue::JobQueue;

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Sent and removed from the queue.
    Acked,
    /// Send failed; the job comes back after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Out of attempts, or failed permanently.
    DeadLettered { reason: String },
    /// The lease ran out before the worker finished, so the queue has
    /// already made the job visible again. A sent email may go out twice.
    LeaseLost,
}

/// Consumes notification jobs: receive, send, then ack, retry or dead-letter.
///
/// Workers only talk to the queue and the mail transport. They never read or
/// lock recipe data, and a failed send never undoes a recipe write.
pub struct NotificationWorker {
    id: String,
    queue: Arc<dyn JobQueue>,
    transport: Arc<dyn MailTransport>,
    config: WorkerConfig,
}

impl NotificationWorker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<dyn JobQueue>,
        transport: Arc<dyn MailTransport>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            transport,
            config,
        }
    }

    /// Drives one delivery to a terminal state.
    pub async fn process(&self, delivery: Delivery) -> QueueResult<JobOutcome> {
        debug!(worker = %self.id, job_id = %delivery.id, attempt = delivery.attempt, "received job");

        if self.config.retry.is_exhausted(delivery.attempt) {
            let reason = format!(
                "delivery limit of {} attempts exceeded",
                self.config.retry.max_attempts
            );
            return self.bury(&delivery, reason).await;
        }

        let sent = match timeout(self.config.send_timeout, self.transport.send(&delivery.job)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.config.send_timeout)),
        };

        match sent {
            Ok(()) => {
                if self.queue.ack(&delivery).await? {
                    info!(worker = %self.id, job_id = %delivery.id, attempt = delivery.attempt, recipient = %delivery.job.recipient, "notification sent");
                    Ok(JobOutcome::Acked)
                } else {
                    warn!(worker = %self.id, job_id = %delivery.id, "lease expired before ack, notification may be sent again");
                    Ok(JobOutcome::LeaseLost)
                }
            }
            Err(err) if !err.is_permanent() && self.config.retry.should_retry(delivery.attempt) => {
                let delay = self.config.retry.delay_for_attempt(delivery.attempt);
                if self.queue.retry(&delivery, delay, &err.to_string()).await? {
                    warn!(worker = %self.id, job_id = %delivery.id, attempt = delivery.attempt, ?delay, error = %err, "send failed, will retry");
                    Ok(JobOutcome::Retrying {
                        attempt: delivery.attempt,
                        delay,
                    })
                } else {
                    warn!(worker = %self.id, job_id = %delivery.id, error = %err, "send failed after lease expired");
                    Ok(JobOutcome::LeaseLost)
                }
            }
            Err(err) => self.bury(&delivery, err.to_string()).await,
        }
    }

    async fn bury(&self, delivery: &Delivery, reason: String) -> QueueResult<JobOutcome> {
        if self.queue.dead_letter(delivery, &reason).await? {
            error!(worker = %self.id, job_id = %delivery.id, attempt = delivery.attempt, recipient = %delivery.job.recipient, %reason, "notification dead-lettered");
            Ok(JobOutcome::DeadLettered { reason })
        } else {
            Ok(JobOutcome::LeaseLost)
        }
    }

    /// Waits for one job and processes it. `Ok(None)` when none arrived.
    pub async fn run_once(&self) -> QueueResult<Option<JobOutcome>> {
        match self.queue.dequeue(self.config.dequeue_wait).await? {
            Some(delivery) => self.process(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    /// Loops until `shutdown` flips to true or its sender goes away. A job
    /// already received is finished before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker = %self.id, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = self.queue.dequeue(self.config.dequeue_wait) => next,
            };
            match next {
                Ok(Some(delivery)) => {
                    if let Err(err) = self.process(delivery).await {
                        error!(worker = %self.id, error = %err, "could not settle job");
                        sleep(Duration::from_secs(1)).await;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    error!(worker = %self.id, error = %err, "job queue unavailable");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!(worker = %self.id, "worker stopped");
    }
}

/// A set of spawned workers sharing one shutdown signal.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signals every worker and waits for them to finish their current job.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                error!(error = %err, "worker task failed");
            }
        }
        info!("worker pool stopped");
    }
}

pub fn start_worker_pool(
    queue: Arc<dyn JobQueue>,
    transport: Arc<dyn MailTransport>,
    config: &WorkerConfig,
) -> WorkerPool {
    let (shutdown, signal) = watch::channel(false);
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let handles = (0..config.concurrency)
        .map(|i| {
            let worker = NotificationWorker::new(
                format!("{host}-{}-{i}", process::id()),
                queue.clone(),
                transport.clone(),
                config.clone(),
            );
            let signal = signal.clone();
            tokio::spawn(async move { worker.run(signal).await })
        })
        .collect();
    info!(concurrency = config.concurrency, "worker pool started");
    WorkerPool { handles, shutdown }
}
