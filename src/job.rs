// src/job.rs
use std::fmt;

use chrono::{DateTime, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};

use crate::recipe::RecipeFields;
use crate::utils::constants::NOTIFICATION_SUBJECT;

/// Queue-assigned job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(nanoid!(10))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One email to send. This is the whole payload carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub subject: String,
    pub recipient: String,
    pub body: String,
}

impl Job {
    pub fn new(subject: impl Into<String>, recipient: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            recipient: recipient.into(),
            body: body.into(),
        }
    }

    /// The confirmation sent after a recipe is added.
    pub fn recipe_added(name: &str, fields: &RecipeFields, recipient: &str) -> Self {
        let body = format!(
            "Hola, has agregado una nueva receta:\n\nNombre: {name}\nIngredientes: {}\nPasos: {}",
            fields.ingredients, fields.steps
        );
        Self::new(NOTIFICATION_SUBJECT, recipient, body)
    }
}

/// A job handed to one worker under a lease.
///
/// `attempt` counts deliveries, starting at 1, and includes redeliveries
/// after a lease expired. `lease` identifies this particular delivery: the
/// queue ignores acknowledgements carrying a stale lease.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: JobId,
    pub job: Job,
    pub attempt: u32,
    pub lease: String,
    pub enqueued_at: DateTime<Utc>,
}

/// A job that exhausted its attempts, kept for inspection and requeue.
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub id: JobId,
    pub subject: String,
    pub recipient: String,
    pub attempts: u32,
    pub error: String,
    pub enqueued_at: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(delivery: &Delivery, error: &str) -> Self {
        Self {
            id: delivery.id.clone(),
            subject: delivery.job.subject.clone(),
            recipient: delivery.job.recipient.clone(),
            attempts: delivery.attempt,
            error: error.to_string(),
            enqueued_at: delivery.enqueued_at,
            failed_at: Utc::now(),
        }
    }
}
