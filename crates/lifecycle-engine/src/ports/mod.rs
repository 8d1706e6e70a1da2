//! Boundaries to the collaborators the engine does not own: the entity store, the stream of
//! entity change notifications, and the downstream backend notifier.

mod events;
mod notify;
mod store;

pub use events::{spawn_event_loop, EntityChangeHandler, EntityEvent};
pub use notify::{BackendNotifier, RecordingNotifier, TracingNotifier};
pub use store::{EntityStore, MemoryEntityStore};
