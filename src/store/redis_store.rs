use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::{AsyncCommands, Script};

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::rdconfig::RedisConnector;
use crate::recipe::RecipeFields;

// KEYS[1] = recipe key, ARGV = field/value pairs. 1 when written.
static CREATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#,
    )
});

static UPDATE_SCRIPT: Lazy<Script> = Lazy::new(|| {
    Script::new(
        r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#,
    )
});

/// Recipes as Redis hashes under `<prefix><name>`.
pub struct RedisRecordStore {
    redis: Arc<RedisConnector>,
    prefix: String,
}

impl RedisRecordStore {
    pub fn new(redis: Arc<RedisConnector>, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    async fn write_if(&self, script: &'static Script, name: &str, fields: &RecipeFields) -> StoreResult<bool> {
        let key = self.key(name);
        let written: i32 = self
            .redis
            .run(|mut conn| async move {
                let mut invocation = script.key(&key);
                for (field, value) in fields.to_pairs() {
                    invocation.arg(field).arg(value);
                }
                invocation.invoke_async::<_, i32>(&mut conn).await
            })
            .await?;
        Ok(written == 1)
    }
}

#[async_trait]
impl RecordStore for RedisRecordStore {
    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let key = self.key(name);
        let exists = self
            .redis
            .run(|mut conn| async move { conn.exists::<_, bool>(&key).await })
            .await?;
        Ok(exists)
    }

    async fn get(&self, name: &str) -> StoreResult<RecipeFields> {
        let key = self.key(name);
        let map = self
            .redis
            .run(|mut conn| async move { conn.hgetall::<_, HashMap<String, String>>(&key).await })
            .await?;
        if map.is_empty() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(RecipeFields::from_hash(map))
    }

    async fn create(&self, name: &str, fields: &RecipeFields) -> StoreResult<()> {
        if self.write_if(&CREATE_SCRIPT, name, fields).await? {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists(name.to_string()))
        }
    }

    async fn update(&self, name: &str, fields: &RecipeFields) -> StoreResult<()> {
        if self.write_if(&UPDATE_SCRIPT, name, fields).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(name.to_string()))
        }
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        let key = self.key(name);
        let removed = self
            .redis
            .run(|mut conn| async move { conn.del::<_, i64>(&key).await })
            .await?;
        if removed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let pattern = format!("{}*", self.prefix);
        let keys = self
            .redis
            .run(|mut conn| async move { conn.keys::<_, Vec<String>>(&pattern).await })
            .await?;
        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(self.prefix.as_str()).map(str::to_string))
            .collect())
    }
}
