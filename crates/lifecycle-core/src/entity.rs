//! Managed entity documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::parse_timestamp;

/// Identifier field of every entity document.
pub const ID_FIELD: &str = "_id";
/// Field holding the current lifecycle state key.
pub const LIFECYCLE_FIELD: &str = "lifecycle";
/// Boolean flag excluding an entity from every automatic transition.
pub const IGNORE_LIFECYCLE_FIELD: &str = "ignoreLifecycle";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entity document must be an object with a string '_id'")]
pub struct InvalidEntity;

/// An identity document as held by the entity store.
///
/// The engine only reads a handful of fields (`_id`, `lifecycle`, `ignoreLifecycle` and the
/// rule's date key); everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct Entity {
    doc: Map<String, Value>,
}

impl Entity {
    /// New document holding only an id.
    pub fn new(id: impl Into<String>) -> Self {
        let mut doc = Map::new();
        doc.insert(ID_FIELD.to_string(), Value::String(id.into()));
        Self { doc }
    }

    /// Set a top-level field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.doc.insert(field.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        self.doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Current lifecycle key, if any.
    pub fn lifecycle(&self) -> Option<&str> {
        self.doc.get(LIFECYCLE_FIELD).and_then(Value::as_str)
    }

    pub fn ignores_lifecycle(&self) -> bool {
        matches!(self.doc.get(IGNORE_LIFECYCLE_FIELD), Some(Value::Bool(true)))
    }

    /// Timestamp stored at `key`, when present and well formed.
    pub fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        self.doc
            .get(key)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.doc
    }

    pub fn document_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.doc
    }
}

impl TryFrom<Map<String, Value>> for Entity {
    type Error = InvalidEntity;

    fn try_from(doc: Map<String, Value>) -> Result<Self, Self::Error> {
        match doc.get(ID_FIELD) {
            Some(Value::String(_)) => Ok(Self { doc }),
            _ => Err(InvalidEntity),
        }
    }
}

impl TryFrom<Value> for Entity {
    type Error = InvalidEntity;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(doc) => Self::try_from(doc),
            _ => Err(InvalidEntity),
        }
    }
}

impl From<Entity> for Map<String, Value> {
    fn from(entity: Entity) -> Self {
        entity.doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let entity = Entity::new("u1")
            .with("lifecycle", "O")
            .with("ignoreLifecycle", true)
            .with("lastLifecycleUpdate", "2024-01-01T00:00:00.000Z");

        assert_eq!(entity.id(), "u1");
        assert_eq!(entity.lifecycle(), Some("O"));
        assert!(entity.ignores_lifecycle());
        assert_eq!(
            entity.timestamp("lastLifecycleUpdate"),
            parse_timestamp("2024-01-01T00:00:00Z")
        );
        assert_eq!(entity.timestamp("missing"), None);
    }

    #[test]
    fn test_ignore_flag_must_be_true() {
        assert!(!Entity::new("u1").with("ignoreLifecycle", "yes").ignores_lifecycle());
        assert!(!Entity::new("u1").ignores_lifecycle());
    }

    #[test]
    fn test_deserialize_requires_string_id() {
        let ok: Entity = serde_json::from_value(json!({ "_id": "a", "x": 1 })).unwrap();
        assert_eq!(ok.id(), "a");
        assert!(serde_json::from_value::<Entity>(json!({ "_id": 1 })).is_err());
        assert!(serde_json::from_value::<Entity>(json!([1])).is_err());
    }
}
