use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::dispatch::Dispatcher;
use crate::mailer::{LogMailer, MailTransport, SmtpMailer};
use crate::queue::{InMemoryJobQueue, JobQueue, RedisJobQueue};
use crate::rdconfig::RedisConnector;
use crate::runner::{start_worker_pool, WorkerPool};
use crate::service::RecipeService;
use crate::store::{InMemoryRecordStore, RecordStore, RedisRecordStore};

/// The process-wide service objects, built once at startup and shared by
/// request handlers and workers.
#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn RecordStore>,
    pub queue: Arc<dyn JobQueue>,
    pub transport: Arc<dyn MailTransport>,
}

impl AppContext {
    /// Redis-backed store and queue, SMTP transport. Connections are opened
    /// lazily, so this only fails on malformed configuration.
    pub fn connect(config: AppConfig) -> Result<Self> {
        let store_redis = Arc::new(
            RedisConnector::open(&config.redis_url, config.redis_timeout)
                .with_context(|| format!("invalid REDIS_URL {}", config.redis_url))?,
        );
        let broker_redis = if config.queue.broker_url == config.redis_url {
            store_redis.clone()
        } else {
            Arc::new(
                RedisConnector::open(&config.queue.broker_url, config.redis_timeout)
                    .with_context(|| format!("invalid BROKER_URL {}", config.queue.broker_url))?,
            )
        };
        let transport = SmtpMailer::new(&config.mail).context("invalid mail configuration")?;

        info!(queue = %config.queue.name, mail_server = %config.mail.server, "using redis backends");
        Ok(Self {
            store: Arc::new(RedisRecordStore::new(store_redis, config.record_prefix.clone())),
            queue: Arc::new(RedisJobQueue::new(
                broker_redis,
                &config.queue.prefix,
                config.queue.settings(),
            )),
            transport: Arc::new(transport),
            config,
        })
    }

    /// Everything in process, emails only logged. For local development.
    pub fn in_memory(config: AppConfig) -> Self {
        info!("using in-memory backends, emails are logged, not sent");
        Self {
            store: Arc::new(InMemoryRecordStore::new()),
            queue: Arc::new(InMemoryJobQueue::new(config.queue.settings())),
            transport: Arc::new(LogMailer),
            config,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.queue.clone(), self.config.queue.enqueue_timeout)
    }

    pub fn recipe_service(&self) -> RecipeService {
        RecipeService::new(self.store.clone(), self.dispatcher())
    }

    pub fn start_workers(&self, concurrency: usize) -> WorkerPool {
        let mut config = self.config.worker.clone();
        config.concurrency = concurrency;
        start_worker_pool(self.queue.clone(), self.transport.clone(), &config)
    }
}
