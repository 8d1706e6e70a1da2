//! Schema validation for rule and state documents.
//!
//! Both validators walk an untyped [`serde_json::Value`] (the parsed YAML document) and either
//! return typed values or every problem found, each qualified by the property path it occurred
//! at (`identities[0].trigger`, `states[2].key`, ...). Nothing is reported lazily: a document
//! with three bad rules yields three sets of violations in one pass.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::filter::Filter;
use crate::rule::{LifecycleRule, DEFAULT_DATE_KEY};
use crate::state::{BuiltinState, LifecycleState, StateCatalog};
use crate::trigger::Trigger;
use crate::update::Update;

/// One failed constraint at one property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Rendered property path; empty for document-level problems.
    pub path: String,
    /// Name of the failed constraint, e.g. `isNotEmpty`.
    pub constraint: &'static str,
    pub message: String,
}

impl Violation {
    pub fn new(path: &FieldPath, constraint: &'static str, message: impl Into<String>) -> Self {
        Self {
            path: path.as_str().to_string(),
            constraint,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} (constraint: {})", self.message, self.constraint)
        } else {
            write!(
                f,
                "Property '{}': {} (constraint: {})",
                self.path, self.message, self.constraint
            )
        }
    }
}

/// One bullet line per violation.
pub fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("• {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Property path builder: `name.prop` for nested fields, `name[idx]` for array elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    pub fn index(&self, idx: usize) -> Self {
        Self(format!("{}[{}]", self.0, idx))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// How messages name the value at this path: `target`, or `each value in sources` for an
    /// array element.
    pub fn subject(&self) -> String {
        let last = self.0.rsplit('.').next().unwrap_or_default();
        match last.split_once('[') {
            Some((field, _)) => format!("each value in {field}"),
            None => last.to_string(),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Rule documents
// =============================================================================

/// Validate a rule document (`identities: [...]`) against the known state space.
///
/// State references are normalized to keys. Unknown properties are dropped.
/// An empty document, or one without `identities`, yields no rules.
pub fn validate_rule_document(
    value: &Value,
    states: &StateCatalog,
) -> Result<Vec<Arc<LifecycleRule>>, Vec<Violation>> {
    let root = FieldPath::root();
    let doc = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(doc) => doc,
        _ => {
            return Err(vec![Violation::new(
                &root,
                "isObject",
                "rule document must be an object",
            )])
        }
    };

    let path = root.field("identities");
    let items = match doc.get("identities") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(vec![Violation::new(
                &path,
                "isArray",
                "identities must be an array",
            )])
        }
    };

    let mut violations = Vec::new();
    let mut rules = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        if let Some(rule) = validate_rule(item, &path.index(idx), states, &mut violations) {
            rules.push(Arc::new(rule));
        }
    }

    if violations.is_empty() {
        Ok(rules)
    } else {
        Err(violations)
    }
}

fn validate_rule(
    value: &Value,
    path: &FieldPath,
    states: &StateCatalog,
    out: &mut Vec<Violation>,
) -> Option<LifecycleRule> {
    let Value::Object(doc) = value else {
        out.push(Violation::new(path, "isObject", "rule must be an object"));
        return None;
    };
    let before = out.len();

    let sources = validate_sources(doc, &path.field("sources"), states, out);
    let target = validate_state_ref(doc.get("target"), &path.field("target"), states, out);

    let date_key = match doc.get("dateKey") {
        None | Some(Value::Null) => Some(DEFAULT_DATE_KEY.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(_) => {
            out.push(Violation::new(
                &path.field("dateKey"),
                "isString",
                "dateKey must be a non-empty string",
            ));
            None
        }
    };

    let rules_path = path.field("rules");
    let rules = match doc.get("rules") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::Object(map)) => match Filter::from_document(map) {
            Ok(filter) => Some(filter),
            Err(e) => {
                out.push(Violation::new(&rules_path, "isFilter", e.to_string()));
                None
            }
        },
        Some(_) => {
            out.push(Violation::new(&rules_path, "isObject", "rules must be an object"));
            None
        }
    };
    let has_rules = matches!(doc.get("rules"), Some(Value::Object(map)) if !map.is_empty());

    let mutation = match doc.get("mutation") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) => Some(Update::from_document(map)),
        Some(_) => {
            out.push(Violation::new(
                &path.field("mutation"),
                "isObject",
                "mutation must be an object",
            ));
            None
        }
    };

    let trigger = match doc.get("trigger") {
        None | Some(Value::Null) => None,
        Some(raw) => match Trigger::parse_value(raw) {
            Ok(trigger) => Some(trigger),
            Err(e) => {
                out.push(Violation::new(&path.field("trigger"), "isTrigger", e.to_string()));
                None
            }
        },
    };
    let has_trigger = !matches!(doc.get("trigger"), None | Some(Value::Null));

    if !has_rules && !has_trigger {
        out.push(Violation::new(
            path,
            "rulesOrTrigger",
            "at least one of rules or trigger must be provided",
        ));
    }

    if out.len() != before {
        return None;
    }
    Some(LifecycleRule {
        sources: sources?,
        target: target?,
        rules,
        mutation,
        trigger,
        date_key: date_key?,
    })
}

fn validate_sources(
    doc: &Map<String, Value>,
    path: &FieldPath,
    states: &StateCatalog,
    out: &mut Vec<Violation>,
) -> Option<Vec<String>> {
    let items = match doc.get("sources") {
        Some(Value::Array(items)) => items,
        _ => {
            out.push(Violation::new(path, "isArray", "sources must be an array"));
            return None;
        }
    };
    if items.is_empty() {
        out.push(Violation::new(path, "isNotEmpty", "sources should not be empty"));
        return None;
    }

    let before = out.len();
    let keys: Vec<String> = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| validate_state_ref(Some(item), &path.index(idx), states, out))
        .collect();
    (out.len() == before).then_some(keys)
}

fn validate_state_ref(
    value: Option<&Value>,
    path: &FieldPath,
    states: &StateCatalog,
    out: &mut Vec<Violation>,
) -> Option<String> {
    let subject = path.subject();
    match value {
        None | Some(Value::Null) => {
            out.push(Violation::new(path, "isNotEmpty", format!("{subject} should not be empty")));
            None
        }
        Some(Value::String(s)) if s.is_empty() => {
            out.push(Violation::new(path, "isNotEmpty", format!("{subject} should not be empty")));
            None
        }
        Some(Value::String(s)) => match states.resolve(s) {
            Some(key) => Some(key),
            None => {
                out.push(Violation::new(
                    path,
                    "isKnownState",
                    format!("unknown lifecycle state '{s}'"),
                ));
                None
            }
        },
        Some(_) => {
            out.push(Violation::new(path, "isString", format!("{subject} must be a string")));
            None
        }
    }
}

// =============================================================================
// State documents
// =============================================================================

/// Validate a state catalog document (`states: [...]`).
///
/// Schema problems are reported first; key constraints (length, uniqueness, no clash with a
/// built-in state) are only checked once the schema is clean. An empty document yields no states.
pub fn validate_state_document(value: &Value) -> Result<Vec<LifecycleState>, Vec<Violation>> {
    let root = FieldPath::root();
    let doc = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Object(doc) => doc,
        _ => {
            return Err(vec![Violation::new(
                &root,
                "isObject",
                "state document must be an object",
            )])
        }
    };

    let path = root.field("states");
    let Some(Value::Array(items)) = doc.get("states") else {
        return Err(vec![Violation::new(&path, "isArray", "states must be an array")]);
    };

    let mut violations = Vec::new();
    let states: Vec<LifecycleState> = items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| validate_state(item, &path.index(idx), &mut violations))
        .collect();
    if !violations.is_empty() {
        return Err(violations);
    }

    let mut seen = HashSet::new();
    for (idx, state) in states.iter().enumerate() {
        let key_path = path.index(idx).field("key");
        let key = &state.key;
        if key.chars().count() != 1 {
            violations.push(Violation::new(
                &key_path,
                "isLength",
                format!("State key '{key}' must be exactly one character"),
            ));
        }
        if !seen.insert(key.as_str()) {
            violations.push(Violation::new(
                &key_path,
                "isUnique",
                format!("Duplicate state key '{key}'"),
            ));
        }
        if BuiltinState::from_key(key).is_some() {
            violations.push(Violation::new(
                &key_path,
                "notBuiltin",
                format!("State key '{key}' conflicts with default lifecycle state"),
            ));
        }
    }

    if violations.is_empty() {
        Ok(states)
    } else {
        Err(violations)
    }
}

fn validate_state(
    value: &Value,
    path: &FieldPath,
    out: &mut Vec<Violation>,
) -> Option<LifecycleState> {
    let Value::Object(doc) = value else {
        out.push(Violation::new(path, "isObject", "state must be an object"));
        return None;
    };

    let key = required_string(doc, "key", path, out);
    let label = required_string(doc, "label", path, out);
    let description = required_string(doc, "description", path, out);
    let icon = optional_string(doc, "icon", path, out);
    let color = optional_string(doc, "color", path, out);

    Some(LifecycleState {
        key: key?,
        label: label?,
        description: description?,
        icon: icon?,
        color: color?,
    })
}

fn required_string(
    doc: &Map<String, Value>,
    name: &str,
    path: &FieldPath,
    out: &mut Vec<Violation>,
) -> Option<String> {
    let path = path.field(name);
    match doc.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            out.push(Violation::new(&path, "isNotEmpty", format!("{name} should not be empty")));
            None
        }
        Some(_) => {
            out.push(Violation::new(&path, "isString", format!("{name} must be a string")));
            None
        }
    }
}

/// `Some(None)` when absent, `None` when present with the wrong type.
fn optional_string(
    doc: &Map<String, Value>,
    name: &str,
    path: &FieldPath,
    out: &mut Vec<Violation>,
) -> Option<Option<String>> {
    match doc.get(name) {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(_) => {
            out.push(Violation::new(
                &path.field(name),
                "isString",
                format!("{name} must be a string"),
            ));
            None
        }
    }
}
