use std::sync::Arc;

use async_trait::async_trait;
use lifecycle_core::Entity;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Change notification published by the entity store.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    Updated {
        before: Entity,
        after: Entity,
    },
    Upserted {
        before: Option<Entity>,
        result: Entity,
    },
}

impl EntityEvent {
    /// Previous and current snapshot.
    pub fn snapshots(&self) -> (Option<&Entity>, &Entity) {
        match self {
            EntityEvent::Updated { before, after } => (Some(before), after),
            EntityEvent::Upserted { before, result } => (before.as_ref(), result),
        }
    }
}

/// Anything that reacts to entity changes.
#[async_trait]
pub trait EntityChangeHandler: Send + Sync {
    /// Called once per change. Failures are handled (logged) by the implementor; there is no
    /// acknowledgement back to the writer.
    async fn on_entity_changed(&self, before: Option<&Entity>, after: &Entity);
}

/// Deliver events from `events` to `handler` one at a time until the channel closes.
pub fn spawn_event_loop(
    handler: Arc<dyn EntityChangeHandler>,
    mut events: UnboundedReceiver<EntityEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Entity event loop started");
        while let Some(event) = events.recv().await {
            let (before, after) = event.snapshots();
            trace!(entity = %after.id(), "Dispatching entity change");
            handler.on_entity_changed(before, after).await;
        }
        debug!("Entity event loop stopped (channel closed)");
    })
}
