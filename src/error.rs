use thiserror::Error;

/// Failures of the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("recipe already exists: {0}")]
    AlreadyExists(String),
    #[error("recipe not found: {0}")]
    NotFound(String),
    #[error("key-value store unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
}

/// Failures of the job queue.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job queue unavailable: {0}")]
    Unavailable(#[from] redis::RedisError),
    #[error("malformed job payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("enqueue timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Returned by the dispatch façade when a job could not be handed to the queue.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("notification not scheduled: {0}")]
    QueueUnavailable(#[from] QueueError),
}

/// Failures of the mail transport, seen only by workers.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("mail server connection failed: {0}")]
    Connection(String),
    #[error("mail server rejected message: {0}")]
    Rejected(String),
    #[error("message could not be built: {0}")]
    InvalidMessage(String),
    #[error("send timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl TransportError {
    /// Permanent failures are dead-lettered without retrying.
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::InvalidMessage(_))
    }
}

/// Errors surfaced to request handlers by [`crate::service::RecipeService`].
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("recipe already exists: {0}")]
    AlreadyExists(String),
    #[error("recipe not found: {0}")]
    NotFound(String),
    #[error("invalid recipe name")]
    InvalidName,
    #[error("key-value store unavailable: {0}")]
    StoreUnavailable(#[source] redis::RedisError),
}

impl From<StoreError> for RecipeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(name) => RecipeError::AlreadyExists(name),
            StoreError::NotFound(name) => RecipeError::NotFound(name),
            StoreError::Unavailable(source) => RecipeError::StoreUnavailable(source),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
    #[error("{0}")]
    Inconsistent(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type QueueResult<T> = Result<T, QueueError>;
