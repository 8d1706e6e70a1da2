//! Rule-driven lifecycle engine.
//!
//! Moves managed entities through lifecycle states along three independent paths:
//!
//! - **Dispatch**: every entity change is matched against the rules of the entity's current
//!   state; the first event-driven rule whose filter matches is applied (one hop per event).
//! - **Sweep**: on a cron schedule, every time-triggered rule selects entities that have sat in
//!   a source state for at least the trigger duration and moves them to the target.
//! - **Manual**: a state change made by an external writer is recorded as-is.
//!
//! Every transition is appended to a [`HistoryStore`].
//!
//! ## Configuration
//!
//! ```text
//! configs/lifecycle/
//! ├── states.yml          # custom states (built-in states are always present)
//! └── rules/
//!     ├── 10-official.yml # rule documents, evaluated in file name order
//!     └── 20-archive.yml
//! ```
//!
//! Both sources are cached by modification-time signature ([`ConfigCache`]) and hot-reloaded:
//! the sweep re-checks them every tick and readers go through a [`FreshnessGate`].

mod bootstrap;
mod cache;
mod clock;
pub mod config;
mod dispatcher;
mod engine;
mod error;
mod freshness;
pub mod history;
mod index;
mod loader;
pub mod ports;
mod scheduler;
mod sweep;

pub use bootstrap::bootstrap_defaults;
pub use cache::ConfigCache;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use dispatcher::{AppliedTransition, DispatchReport, Dispatcher};
pub use engine::{EngineSnapshot, LifecycleEngine};
pub use error::{ConfigLoadError, EngineError, EngineResult, FileViolations};
pub use freshness::FreshnessGate;
pub use history::{HistoryStore, JsonlHistoryStore, MemoryHistoryStore};
pub use index::{IndexedRule, SourceIndex};
pub use loader::{RuleLoader, StateLoader};
pub use ports::{
    spawn_event_loop, BackendNotifier, EntityChangeHandler, EntityEvent, EntityStore,
    MemoryEntityStore, RecordingNotifier, TracingNotifier,
};
pub use scheduler::{CronSchedule, SweepScheduler, SweepTarget};
pub use sweep::{trigger_queries, SweepFailure, SweepReport, Sweeper, TriggerQuery};
