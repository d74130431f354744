use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::RecordStore;
use crate::error::{StoreError, StoreResult};
use crate::recipe::RecipeFields;

/// Process-local record store. Used by tests and `serve --in-memory`.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    recipes: RwLock<HashMap<String, RecipeFields>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self.recipes.read().await.contains_key(name))
    }

    async fn get(&self, name: &str) -> StoreResult<RecipeFields> {
        self.recipes
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn create(&self, name: &str, fields: &RecipeFields) -> StoreResult<()> {
        let mut recipes = self.recipes.write().await;
        if recipes.contains_key(name) {
            return Err(StoreError::AlreadyExists(name.to_string()));
        }
        recipes.insert(name.to_string(), fields.clone());
        Ok(())
    }

    async fn update(&self, name: &str, fields: &RecipeFields) -> StoreResult<()> {
        match self.recipes.write().await.get_mut(name) {
            Some(stored) => {
                *stored = fields.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(name.to_string())),
        }
    }

    async fn delete(&self, name: &str) -> StoreResult<()> {
        self.recipes
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        Ok(self.recipes.read().await.keys().cloned().collect())
    }
}
