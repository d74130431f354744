//! Recipe persistence.
//!
//! One hash per recipe, keyed by name. Every operation is a round trip to the
//! backing store; nothing is cached in process.

mod memory;
mod redis_store;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::recipe::RecipeFields;

pub use self::memory::InMemoryRecordStore;
pub use self::redis_store::RedisRecordStore;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn exists(&self, name: &str) -> StoreResult<bool>;

    /// Fails with `NotFound` when no hash is stored under `name`.
    async fn get(&self, name: &str) -> StoreResult<RecipeFields>;

    /// Atomic check-and-set: exactly one of several concurrent creators of
    /// the same name succeeds, the rest get `AlreadyExists`.
    async fn create(&self, name: &str, fields: &RecipeFields) -> StoreResult<()>;

    /// Overwrites an existing recipe. Never creates one.
    async fn update(&self, name: &str, fields: &RecipeFields) -> StoreResult<()>;

    async fn delete(&self, name: &str) -> StoreResult<()>;

    /// Recipe names in store order.
    async fn list(&self) -> StoreResult<Vec<String>>;
}
