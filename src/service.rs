//! Recipe operations as seen by request handlers.
//!
//! Creation is where the store and the queue meet: the notification job is
//! enqueued only after the store has confirmed the write. If the process dies
//! or the queue fails in between, the recipe exists without a notification,
//! which is logged and reported to the caller. The reverse, a notification
//! for a recipe that was never stored, cannot happen.

use std::sync::Arc;

use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::error::{DispatchError, RecipeError};
use crate::job::{Job, JobId};
use crate::recipe::{Recipe, RecipeFields};
use crate::store::RecordStore;

/// What happened to the confirmation email of a newly created recipe.
#[derive(Debug)]
pub enum Notification {
    Scheduled(JobId),
    NotScheduled(DispatchError),
}

#[derive(Debug)]
pub struct Created {
    pub name: String,
    pub notification: Notification,
}

#[derive(Clone)]
pub struct RecipeService {
    store: Arc<dyn RecordStore>,
    dispatcher: Dispatcher,
}

impl RecipeService {
    pub fn new(store: Arc<dyn RecordStore>, dispatcher: Dispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Names sorted for display.
    pub async fn list(&self) -> Result<Vec<String>, RecipeError> {
        let mut names = self.store.list().await?;
        names.sort();
        Ok(names)
    }

    pub async fn get(&self, name: &str) -> Result<Recipe, RecipeError> {
        let fields = self.store.get(name).await?;
        Ok(Recipe {
            name: name.to_string(),
            fields,
        })
    }

    /// Stores the recipe, then schedules the confirmation for `recipient`.
    ///
    /// `AlreadyExists` leaves the stored recipe untouched and schedules
    /// nothing. A queue failure does not fail the call: the recipe is
    /// stored and the returned `Created` says the email was not scheduled.
    pub async fn create(
        &self,
        name: &str,
        fields: RecipeFields,
        recipient: &str,
    ) -> Result<Created, RecipeError> {
        let name = normalize(name)?;
        self.store.create(&name, &fields).await?;
        info!(recipe = %name, "recipe created");

        let job = Job::recipe_added(&name, &fields, recipient);
        let notification = match self.dispatcher.enqueue(job).await {
            Ok(id) => Notification::Scheduled(id),
            Err(err) => {
                warn!(recipe = %name, recipient, error = %err, "notification gap: recipe stored without confirmation email");
                Notification::NotScheduled(err)
            }
        };
        Ok(Created { name, notification })
    }

    pub async fn update(&self, name: &str, fields: RecipeFields) -> Result<(), RecipeError> {
        self.store.update(name, &fields).await?;
        info!(recipe = %name, "recipe updated");
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), RecipeError> {
        self.store.delete(name).await?;
        info!(recipe = %name, "recipe deleted");
        Ok(())
    }
}

fn normalize(name: &str) -> Result<String, RecipeError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RecipeError::InvalidName);
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::queue::{InMemoryJobQueue, JobQueue, QueueSettings};
    use crate::store::InMemoryRecordStore;

    fn service() -> (RecipeService, Arc<InMemoryRecordStore>, Arc<InMemoryJobQueue>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let queue = Arc::new(InMemoryJobQueue::new(QueueSettings::new("test")));
        let dispatcher = Dispatcher::new(queue.clone(), Duration::from_secs(1));
        (RecipeService::new(store.clone(), dispatcher), store, queue)
    }

    #[tokio::test]
    async fn create_schedules_exactly_one_job() {
        let (service, _, queue) = service();
        let created = service
            .create("Tarta", RecipeFields::new("harina", "hornear"), "a@b.com")
            .await
            .unwrap();

        assert!(matches!(created.notification, Notification::Scheduled(_)));
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn duplicate_create_schedules_nothing() {
        let (service, store, queue) = service();
        service
            .create("Tarta", RecipeFields::new("harina", "hornear"), "a@b.com")
            .await
            .unwrap();

        let err = service
            .create("Tarta", RecipeFields::new("otra", "cosa"), "c@d.com")
            .await
            .unwrap_err();
        assert!(matches!(err, RecipeError::AlreadyExists(_)));
        assert_eq!(
            store.get("Tarta").await.unwrap(),
            RecipeFields::new("harina", "hornear")
        );
        assert_eq!(queue.stats().await.unwrap().pending, 1);
    }

    #[tokio::test]
    async fn blank_name_is_rejected_before_touching_the_store() {
        let (service, store, queue) = service();
        let err = service
            .create("   ", RecipeFields::default(), "a@b.com")
            .await
            .unwrap_err();

        assert!(matches!(err, RecipeError::InvalidName));
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(queue.stats().await.unwrap().pending, 0);
    }

    #[tokio::test]
    async fn names_are_trimmed_and_listed_sorted() {
        let (service, _, _) = service();
        for name in ["  Tarta ", "Arepa", "Mole"] {
            service
                .create(name, RecipeFields::default(), "a@b.com")
                .await
                .unwrap();
        }
        assert_eq!(service.list().await.unwrap(), vec!["Arepa", "Mole", "Tarta"]);
    }

    #[tokio::test]
    async fn missing_recipe_maps_to_not_found() {
        let (service, _, _) = service();
        assert!(matches!(service.get("x").await, Err(RecipeError::NotFound(_))));
        assert!(matches!(
            service.update("x", RecipeFields::default()).await,
            Err(RecipeError::NotFound(_))
        ));
        assert!(matches!(service.delete("x").await, Err(RecipeError::NotFound(_))));
    }
}
