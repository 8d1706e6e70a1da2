//! Transition rules and the rule set loaded from rule documents.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::filter::Filter;
use crate::trigger::Trigger;
use crate::update::Update;

/// Timestamp field tracked when a rule does not name one.
pub const DEFAULT_DATE_KEY: &str = "lastLifecycleUpdate";

/// Mapping from one or more source states to a target state.
///
/// A rule fires on entity change when it has no trigger and its `rules` filter matches.
/// A rule with a trigger is only ever applied by the sweep, once the entity has sat in a
/// source state for at least the trigger duration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleRule {
    /// State keys this rule applies to. Never empty.
    pub sources: Vec<String>,
    /// State key reached.
    pub target: String,
    /// Field filter gating the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Filter>,
    /// Fields set alongside the state change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutation: Option<Update>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger: Option<Trigger>,
    /// Timestamp field compared against the trigger and refreshed on transition.
    pub date_key: String,
}

impl LifecycleRule {
    pub fn new<I, S>(sources: I, target: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            target: target.into(),
            rules: None,
            mutation: None,
            trigger: None,
            date_key: DEFAULT_DATE_KEY.to_string(),
        }
    }

    pub fn with_rules(mut self, rules: Filter) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn with_mutation(mut self, mutation: Update) -> Self {
        self.mutation = Some(mutation);
        self
    }

    pub fn with_trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_date_key(mut self, date_key: impl Into<String>) -> Self {
        self.date_key = date_key.into();
        self
    }

    /// Handled by the sweep rather than by event dispatch.
    pub fn is_time_triggered(&self) -> bool {
        self.trigger.is_some()
    }

    /// The rule's field filter, or the empty filter.
    pub fn filter(&self) -> Filter {
        self.rules.clone().unwrap_or_default()
    }

    /// The rule's mutation, or the empty update.
    pub fn mutation(&self) -> Update {
        self.mutation.clone().unwrap_or_default()
    }
}

/// Where a rule came from: its file and 0-based position in that file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RuleOrigin {
    pub file: String,
    pub position: usize,
}

impl fmt::Display for RuleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.file, self.position)
    }
}

/// Rules parsed from one document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleFile {
    pub name: String,
    pub rules: Vec<Arc<LifecycleRule>>,
}

/// Every loaded rule, grouped by file. Files are kept in name order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleSet {
    files: Vec<RuleFile>,
}

impl RuleSet {
    pub fn new(files: Vec<RuleFile>) -> Self {
        Self { files }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[RuleFile] {
        &self.files
    }

    /// Rules in evaluation order: file order, then definition order.
    pub fn iter(&self) -> impl Iterator<Item = (RuleOrigin, &Arc<LifecycleRule>)> {
        self.files.iter().flat_map(|file| {
            file.rules.iter().enumerate().map(move |(position, rule)| {
                (
                    RuleOrigin {
                        file: file.name.clone(),
                        position,
                    },
                    rule,
                )
            })
        })
    }

    pub fn rule_count(&self) -> usize {
        self.files.iter().map(|f| f.rules.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.rule_count() == 0
    }
}
