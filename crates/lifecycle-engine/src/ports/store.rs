use std::collections::BTreeMap;

use async_trait::async_trait;
use lifecycle_core::{Entity, Filter, Update};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::RwLock;
use tracing::debug;

use super::events::EntityEvent;
use crate::error::{EngineError, EngineResult};

/// Document store holding the managed entities.
///
/// `find_one_and_update` must be atomic per document: the filter is evaluated and the update
/// applied without another writer observing or modifying the document in between.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Every entity matching `filter`.
    async fn find(&self, filter: &Filter) -> EngineResult<Vec<Entity>>;

    /// Apply `update` to the first entity matching `filter`; returns the updated entity, or
    /// `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> EngineResult<Option<Entity>>;

    async fn find_by_id(&self, id: &str) -> EngineResult<Option<Entity>>;
}

/// In-process entity store.
///
/// Writes made through [`update`](Self::update) and [`upsert`](Self::upsert) publish
/// [`EntityEvent`]s when a channel is attached. Writes made by the engine through
/// [`EntityStore::find_one_and_update`] do not, so an automatic transition never re-enters
/// the dispatcher.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    docs: RwLock<BTreeMap<String, Entity>>,
    events: Option<UnboundedSender<EntityEvent>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish change events to `events`.
    pub fn with_events(mut self, events: UnboundedSender<EntityEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Insert or replace without publishing an event (seeding).
    pub async fn insert(&self, entity: Entity) {
        self.docs
            .write()
            .await
            .insert(entity.id().to_string(), entity);
    }

    /// Apply `update` to entity `id` and publish `Updated`. Returns `(before, after)`.
    pub async fn update(&self, id: &str, update: &Update) -> EngineResult<(Entity, Entity)> {
        let (before, after) = {
            let mut docs = self.docs.write().await;
            let entity = docs
                .get_mut(id)
                .ok_or_else(|| EngineError::Store(format!("entity '{id}' not found")))?;
            let before = entity.clone();
            update.apply(entity.document_mut());
            (before, entity.clone())
        };
        self.publish(EntityEvent::Updated {
            before: before.clone(),
            after: after.clone(),
        });
        Ok((before, after))
    }

    /// Insert or replace `entity` and publish `Upserted`. Returns the previous document, if any.
    pub async fn upsert(&self, entity: Entity) -> Option<Entity> {
        let before = self
            .docs
            .write()
            .await
            .insert(entity.id().to_string(), entity.clone());
        self.publish(EntityEvent::Upserted {
            before: before.clone(),
            result: entity,
        });
        before
    }

    pub async fn len(&self) -> usize {
        self.docs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.read().await.is_empty()
    }

    /// Every entity, ordered by id.
    pub async fn all(&self) -> Vec<Entity> {
        self.docs.read().await.values().cloned().collect()
    }

    fn publish(&self, event: EntityEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                debug!("Entity event receiver dropped, event discarded");
            }
        }
    }
}

#[async_trait]
impl EntityStore for MemoryEntityStore {
    async fn find(&self, filter: &Filter) -> EngineResult<Vec<Entity>> {
        Ok(self
            .docs
            .read()
            .await
            .values()
            .filter(|e| filter.matches(e.document()))
            .cloned()
            .collect())
    }

    async fn find_one_and_update(
        &self,
        filter: &Filter,
        update: &Update,
    ) -> EngineResult<Option<Entity>> {
        let mut docs = self.docs.write().await;
        let Some(entity) = docs.values_mut().find(|e| filter.matches(e.document())) else {
            return Ok(None);
        };
        update.apply(entity.document_mut());
        Ok(Some(entity.clone()))
    }

    async fn find_by_id(&self, id: &str) -> EngineResult<Option<Entity>> {
        Ok(self.docs.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_find_one_and_update_is_conditional() {
        let store = MemoryEntityStore::new();
        store
            .insert(Entity::new("u1").with("lifecycle", "O").with("department", "IT"))
            .await;

        let miss = Filter::new().id_eq("u1").with(
            "department",
            lifecycle_core::Condition::Eq("HR".into()),
        );
        let result = store
            .find_one_and_update(&miss, &Update::new().set("lifecycle", "M"))
            .await
            .unwrap();
        assert!(result.is_none());

        let hit = Filter::new().id_eq("u1");
        let updated = store
            .find_one_and_update(&hit, &Update::new().set("lifecycle", "M"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.lifecycle(), Some("M"));
    }

    #[tokio::test]
    async fn test_external_writes_publish_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let store = MemoryEntityStore::new().with_events(tx);
        store.insert(Entity::new("u1").with("lifecycle", "A")).await;

        store
            .update("u1", &Update::new().set("lifecycle", "O"))
            .await
            .unwrap();
        match rx.recv().await.unwrap() {
            EntityEvent::Updated { before, after } => {
                assert_eq!(before.lifecycle(), Some("A"));
                assert_eq!(after.lifecycle(), Some("O"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        store.upsert(Entity::new("u2").with("lifecycle", "P")).await;
        assert!(matches!(
            rx.recv().await.unwrap(),
            EntityEvent::Upserted { before: None, .. }
        ));

        // Engine-side writes stay silent.
        store
            .find_one_and_update(&Filter::new().id_eq("u1"), &Update::new().set("x", 1))
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_entity_fails() {
        let store = MemoryEntityStore::new();
        let err = store.update("ghost", &Update::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
    }
}
