//! Field-match filters over JSON entity documents.
//!
//! A [`Filter`] is a conjunction of clauses, each binding a dotted field path to a
//! [`Condition`]. Filters are written in rule documents using the familiar document-query
//! shape:
//!
//! ```yaml
//! rules:
//!   department: IT
//!   roles: { $in: [admin, ops] }
//!   contract.end: { $exists: true }
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::entity::{ID_FIELD, IGNORE_LIFECYCLE_FIELD, LIFECYCLE_FIELD};
use crate::{format_timestamp, parse_timestamp};

/// Problems found while reading a filter document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("unknown operator '{operator}' on '{path}'")]
    UnknownOperator { path: String, operator: String },

    #[error("operator '{operator}' on '{path}' expects an array")]
    ExpectedArray { path: String, operator: String },

    #[error("operator '{operator}' on '{path}' expects a boolean")]
    ExpectedBool { path: String, operator: String },

    #[error("'{path}' mixes operators with plain fields")]
    MixedOperators { path: String },
}

/// Condition applied to the value(s) found at a field path.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Equal; an array field matches when any element is equal. `Eq(null)` matches a missing field.
    Eq(Value),
    /// Negation of [`Condition::Eq`].
    Ne(Value),
    /// Equal to any of the listed values.
    In(Vec<Value>),
    /// Equal to none of the listed values.
    Nin(Vec<Value>),
    /// Field presence.
    Exists(bool),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
}

impl Condition {
    fn operator(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "$eq",
            Condition::Ne(_) => "$ne",
            Condition::In(_) => "$in",
            Condition::Nin(_) => "$nin",
            Condition::Exists(_) => "$exists",
            Condition::Gt(_) => "$gt",
            Condition::Gte(_) => "$gte",
            Condition::Lt(_) => "$lt",
            Condition::Lte(_) => "$lte",
        }
    }

    fn operand(&self) -> Value {
        match self {
            Condition::Eq(v)
            | Condition::Ne(v)
            | Condition::Gt(v)
            | Condition::Gte(v)
            | Condition::Lt(v)
            | Condition::Lte(v) => v.clone(),
            Condition::In(vs) | Condition::Nin(vs) => Value::Array(vs.clone()),
            Condition::Exists(b) => Value::Bool(*b),
        }
    }

    fn parse(path: &str, operator: &str, operand: &Value) -> Result<Self, FilterError> {
        let list = || match operand {
            Value::Array(items) => Ok(items.clone()),
            _ => Err(FilterError::ExpectedArray {
                path: path.to_string(),
                operator: operator.to_string(),
            }),
        };
        Ok(match operator {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$in" => Condition::In(list()?),
            "$nin" => Condition::Nin(list()?),
            "$exists" => match operand {
                Value::Bool(b) => Condition::Exists(*b),
                _ => {
                    return Err(FilterError::ExpectedBool {
                        path: path.to_string(),
                        operator: operator.to_string(),
                    })
                }
            },
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            other => {
                return Err(FilterError::UnknownOperator {
                    path: path.to_string(),
                    operator: other.to_string(),
                })
            }
        })
    }

    fn matches(&self, found: &[&Value]) -> bool {
        match self {
            Condition::Eq(expected) => eq_any(found, expected),
            Condition::Ne(expected) => !eq_any(found, expected),
            Condition::In(options) => options.iter().any(|o| eq_any(found, o)),
            Condition::Nin(options) => !options.iter().any(|o| eq_any(found, o)),
            Condition::Exists(wanted) => !found.is_empty() == *wanted,
            Condition::Gt(bound) => cmp_any(found, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => cmp_any(found, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => cmp_any(found, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => cmp_any(found, bound, |o| o != Ordering::Greater),
        }
    }
}

/// A single `(path, condition)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub path: String,
    pub condition: Condition,
}

/// Conjunction of clauses. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a filter object as written in a rule document.
    pub fn from_document(doc: &Map<String, Value>) -> Result<Self, FilterError> {
        let mut filter = Filter::new();
        for (path, value) in doc {
            if path.starts_with('$') {
                return Err(FilterError::UnknownOperator {
                    path: String::new(),
                    operator: path.clone(),
                });
            }
            match value {
                Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
                    if !ops.keys().all(|k| k.starts_with('$')) {
                        return Err(FilterError::MixedOperators { path: path.clone() });
                    }
                    for (operator, operand) in ops {
                        let condition = Condition::parse(path, operator, operand)?;
                        filter = filter.with(path.clone(), condition);
                    }
                }
                other => filter = filter.with(path.clone(), Condition::Eq(other.clone())),
            }
        }
        Ok(filter)
    }

    /// Add a clause.
    pub fn with(mut self, path: impl Into<String>, condition: Condition) -> Self {
        self.clauses.push(Clause {
            path: path.into(),
            condition,
        });
        self
    }

    /// Conjunction of both filters.
    pub fn and(mut self, other: &Filter) -> Self {
        self.clauses.extend(other.clauses.iter().cloned());
        self
    }

    /// `_id` equals `id`.
    pub fn id_eq(self, id: &str) -> Self {
        self.with(ID_FIELD, Condition::Eq(Value::String(id.to_string())))
    }

    /// `lifecycle` is one of `keys`.
    pub fn lifecycle_in<I, S>(self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys.into_iter().map(|k| Value::String(k.into())).collect();
        self.with(LIFECYCLE_FIELD, Condition::In(keys))
    }

    /// The entity is not flagged to skip lifecycle processing.
    pub fn not_ignoring_lifecycle(self) -> Self {
        self.with(IGNORE_LIFECYCLE_FIELD, Condition::Ne(Value::Bool(true)))
    }

    /// Timestamp stored at `key` is at or before `at`.
    pub fn timestamp_lte(self, key: &str, at: DateTime<Utc>) -> Self {
        self.with(key, Condition::Lte(Value::String(format_timestamp(at))))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether `doc` satisfies every clause.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.clauses.iter().all(|clause| {
            let mut found = Vec::new();
            resolve(doc, &clause.path, &mut found);
            clause.condition.matches(&found)
        })
    }

    /// Render back to the document-query shape.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut doc = Map::new();
        for clause in &self.clauses {
            let entry = doc
                .entry(clause.path.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(
                    clause.condition.operator().to_string(),
                    clause.condition.operand(),
                );
            }
        }
        // Collapse lone `$eq` clauses back to plain values.
        for value in doc.values_mut() {
            let plain = match value {
                Value::Object(ops) if ops.len() == 1 => ops.get("$eq").cloned(),
                _ => None,
            };
            if let Some(plain) = plain.filter(|p| !p.is_object()) {
                *value = plain;
            }
        }
        doc
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

/// Collect every value reachable at `path`, descending into arrays of objects.
fn resolve<'a>(doc: &'a Map<String, Value>, path: &str, out: &mut Vec<&'a Value>) {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let Some(value) = doc.get(head) else {
        return;
    };
    match rest {
        None => out.push(value),
        Some(rest) => descend(value, rest, out),
    }
}

fn descend<'a>(value: &'a Value, rest: &str, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => resolve(map, rest, out),
        Value::Array(items) => {
            for item in items {
                descend(item, rest, out);
            }
        }
        _ => {}
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn eq_any(found: &[&Value], expected: &Value) -> bool {
    if found.is_empty() {
        return expected.is_null();
    }
    found.iter().any(|value| {
        values_equal(value, expected)
            || matches!(value, Value::Array(items) if items.iter().any(|i| values_equal(i, expected)))
    })
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => match (parse_timestamp(x), parse_timestamp(y)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => Some(x.cmp(y)),
        },
        _ => None,
    }
}

fn cmp_any(found: &[&Value], bound: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    found.iter().any(|value| match value {
        Value::Array(items) => items
            .iter()
            .any(|i| compare(i, bound).is_some_and(&accept)),
        other => compare(other, bound).is_some_and(&accept),
    })
}
