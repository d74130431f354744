//! Recipe book backed by a key-value store, with queued email notifications.
//!
//! Request handlers write recipes through a [`store::RecordStore`] and hand
//! notification jobs to a [`queue::JobQueue`] through the [`dispatch::Dispatcher`].
//! Workers in [`runner`] pull jobs off the queue, send them through a
//! [`mailer::MailTransport`] and acknowledge them. Delivery is at-least-once.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod mailer;
pub mod queue;
pub mod rdconfig;
pub mod recipe;
pub mod retry;
pub mod runner;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod utils;
pub mod web;

pub use config::AppConfig;
pub use context::AppContext;
pub use dispatch::Dispatcher;
pub use error::{ConfigError, DispatchError, QueueError, RecipeError, StoreError, TransportError};
pub use job::{Delivery, Job, JobId};
pub use recipe::{Recipe, RecipeFields};
pub use service::RecipeService;
