//! Source-state index over the loaded rule set.

use std::collections::BTreeMap;
use std::sync::Arc;

use lifecycle_core::{LifecycleRule, RuleOrigin, RuleSet};
use serde::Serialize;

/// A rule together with where it was declared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedRule {
    pub origin: RuleOrigin,
    pub rule: Arc<LifecycleRule>,
}

/// Mapping from a source state key to its candidate rules, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceIndex {
    buckets: BTreeMap<String, Vec<IndexedRule>>,
}

impl SourceIndex {
    /// Fold `rules` into per-source buckets, preserving file then definition order.
    pub fn build(rules: &RuleSet) -> Self {
        let mut buckets: BTreeMap<String, Vec<IndexedRule>> = BTreeMap::new();
        for (origin, rule) in rules.iter() {
            for source in &rule.sources {
                buckets.entry(source.clone()).or_default().push(IndexedRule {
                    origin: origin.clone(),
                    rule: Arc::clone(rule),
                });
            }
        }
        Self { buckets }
    }

    /// Candidate rules for entities currently in `source`.
    pub fn candidates(&self, source: &str) -> &[IndexedRule] {
        self.buckets.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every source key with at least one rule, sorted.
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.buckets.keys().map(String::as_str)
    }

    /// Buckets in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[IndexedRule])> {
        self.buckets.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of source keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
