//! `$set`-style updates applied to entity documents.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A set of dotted field paths and the values to write at them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Update {
    set: BTreeMap<String, Value>,
}

impl Update {
    /// Empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a mutation object as written in a rule document.
    pub fn from_document(doc: &Map<String, Value>) -> Self {
        Self {
            set: doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    /// Set `path` to `value`, replacing any earlier value for the same path.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(path.into(), value.into());
        self
    }

    /// Merge another update; fields from `other` win.
    pub fn merge(mut self, other: &Update) -> Self {
        for (k, v) in &other.set {
            self.set.insert(k.clone(), v.clone());
        }
        self
    }

    /// Paths and values, sorted by path.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.set.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Write every field into `doc`, creating intermediate objects along dotted paths.
    ///
    /// A non-object value sitting on the path is replaced by an object.
    pub fn apply(&self, doc: &mut Map<String, Value>) {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone());
        }
    }
}

fn set_path(doc: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = doc;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        current = match slot {
            Value::Object(map) => map,
            _ => return,
        };
    }
}
