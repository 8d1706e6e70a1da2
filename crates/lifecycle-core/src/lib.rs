//! Core domain types for the identity lifecycle engine.
//!
//! An identity moves through a set of named lifecycle states. Each state is identified by a
//! single-character key; a fixed set of built-in states is always present and deployments may
//! add custom states through a catalog document.
//!
//! ## Core Concepts
//!
//! - **LifecycleState**: a named point in an identity's lifecycle (`key`, `label`, ...)
//! - **LifecycleRule**: a mapping from source states to a target state, gated by a field
//!   [`Filter`] and/or an elapsed-time [`Trigger`]
//! - **RuleSet**: every rule loaded from the rule documents, in file then definition order
//! - **Entity**: a managed document (an identity) carrying a `lifecycle` field
//! - **HistoryEntry**: an immutable audit record of one transition
//!
//! Rule and state documents are checked by the functions in [`validation`], which return
//! either typed values or a list of path-qualified [`Violation`]s.

mod entity;
mod filter;
mod history;
mod rule;
mod state;
mod trigger;
mod update;
pub mod validation;

pub use entity::{Entity, InvalidEntity, ID_FIELD, IGNORE_LIFECYCLE_FIELD, LIFECYCLE_FIELD};
pub use filter::{Clause, Condition, Filter, FilterError};
pub use history::{HistoryEntry, LifecycleStat, Page, Paged, DEFAULT_PAGE_LIMIT};
pub use rule::{LifecycleRule, RuleFile, RuleOrigin, RuleSet, DEFAULT_DATE_KEY};
pub use state::{BuiltinState, LifecycleState, StateCatalog};
pub use trigger::{InvalidTrigger, Trigger, MAX_TRIGGER_SECS};
pub use update::Update;
pub use validation::{format_violations, FieldPath, Violation};

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp the way it is stored inside entity documents.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp stored inside an entity document.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
