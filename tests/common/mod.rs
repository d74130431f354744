#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use recetario::config::WorkerConfig;
use recetario::error::{QueueError, QueueResult, TransportError};
use recetario::job::{DeadLetter, Delivery, Job, JobId};
use recetario::mailer::MailTransport;
use recetario::queue::{InMemoryJobQueue, JobQueue, QueueSettings, QueueStats};
use recetario::retry::RetryPolicy;
use recetario::store::{InMemoryRecordStore, RecordStore};
use recetario::{Dispatcher, RecipeService};

pub const VISIBILITY: Duration = Duration::from_secs(30);

/// Records every job it is asked to send, together with whether `recipe`
/// was already in the store at send time.
pub struct RecordingTransport {
    store: Arc<dyn RecordStore>,
    recipe: String,
    pub sent: Mutex<Vec<(Job, bool)>>,
}

impl RecordingTransport {
    pub fn new(store: Arc<dyn RecordStore>, recipe: &str) -> Self {
        Self {
            store,
            recipe: recipe.to_string(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub async fn jobs(&self) -> Vec<Job> {
        self.sent.lock().await.iter().map(|(job, _)| job.clone()).collect()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, job: &Job) -> Result<(), TransportError> {
        let stored = self
            .store
            .exists(&self.recipe)
            .await
            .map_err(|err| TransportError::Connection(err.to_string()))?;
        self.sent.lock().await.push((job.clone(), stored));
        Ok(())
    }
}

/// A broker that refuses every connection.
pub struct DownQueue;

fn refused() -> QueueError {
    QueueError::Unavailable(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "connection refused",
    )))
}

#[async_trait]
impl JobQueue for DownQueue {
    async fn enqueue(&self, _job: &Job) -> QueueResult<JobId> {
        Err(refused())
    }
    async fn dequeue(&self, _wait: Duration) -> QueueResult<Option<Delivery>> {
        Err(refused())
    }
    async fn ack(&self, _delivery: &Delivery) -> QueueResult<bool> {
        Err(refused())
    }
    async fn retry(&self, _delivery: &Delivery, _delay: Duration, _error: &str) -> QueueResult<bool> {
        Err(refused())
    }
    async fn dead_letter(&self, _delivery: &Delivery, _error: &str) -> QueueResult<bool> {
        Err(refused())
    }
    async fn dead_letters(&self, _limit: usize) -> QueueResult<Vec<DeadLetter>> {
        Err(refused())
    }
    async fn requeue_dead(&self, _id: &JobId) -> QueueResult<bool> {
        Err(refused())
    }
    async fn stats(&self) -> QueueResult<QueueStats> {
        Err(refused())
    }
}

pub struct Pipeline {
    pub store: Arc<InMemoryRecordStore>,
    pub queue: Arc<InMemoryJobQueue>,
    pub service: RecipeService,
}

pub fn pipeline() -> Pipeline {
    let store = Arc::new(InMemoryRecordStore::new());
    let queue = Arc::new(InMemoryJobQueue::new(
        QueueSettings::new("notifications").with_visibility_timeout(VISIBILITY),
    ));
    let dispatcher = Dispatcher::new(queue.clone(), Duration::from_secs(2));
    let service = RecipeService::new(store.clone(), dispatcher);
    Pipeline {
        store,
        queue,
        service,
    }
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 1,
        retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
        send_timeout: Duration::from_secs(5),
        dequeue_wait: Duration::from_secs(1),
    }
}
