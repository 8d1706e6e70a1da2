//! Time-triggered sweep.
//!
//! The selection logic is the pure function [`trigger_queries`]; [`Sweeper`] runs the
//! resulting queries against an [`EntityStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lifecycle_core::{Filter, LifecycleRule, RuleOrigin, RuleSet, Update};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{transition_update, AppliedTransition};
use crate::history::HistoryStore;
use crate::ports::EntityStore;

/// What one time-triggered rule selects and writes at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerQuery {
    pub origin: RuleOrigin,
    pub rule: Arc<LifecycleRule>,
    /// Entities in a source state, not ignoring lifecycle, matching the rule's filter, whose
    /// date key is at or before `cutoff`.
    pub filter: Filter,
    pub update: Update,
    pub cutoff: DateTime<Utc>,
}

/// One query per time-triggered rule, in evaluation order.
///
/// A rule whose cutoff falls outside the representable time range selects nothing and is
/// left out.
pub fn trigger_queries(now: DateTime<Utc>, rules: &RuleSet) -> Vec<TriggerQuery> {
    rules
        .iter()
        .filter_map(|(origin, rule)| {
            let trigger = rule.trigger?;
            let Some(cutoff) = now.checked_sub_signed(trigger.as_duration()) else {
                warn!(rule = %origin, trigger = %trigger, "Trigger cutoff out of range, rule skipped");
                return None;
            };
            let filter = rule
                .filter()
                .lifecycle_in(rule.sources.iter().cloned())
                .not_ignoring_lifecycle()
                .timestamp_lte(&rule.date_key, cutoff);
            Some(TriggerQuery {
                origin,
                rule: Arc::clone(rule),
                filter,
                update: transition_update(rule, now),
                cutoff,
            })
        })
        .collect()
}

/// A rule (or one entity under it) that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepFailure {
    pub origin: RuleOrigin,
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub message: String,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub transitions: Vec<AppliedTransition>,
    pub failures: Vec<SweepFailure>,
}

/// Applies time-triggered rules to the entity store.
pub struct Sweeper {
    entities: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryStore>,
}

impl Sweeper {
    pub fn new(entities: Arc<dyn EntityStore>, history: Arc<dyn HistoryStore>) -> Self {
        Self { entities, history }
    }

    /// Transition every entity that has sat in a source state for longer than its rule's
    /// trigger. Restricted to rules listing `source` when given.
    ///
    /// Each write re-checks the selection filter for that entity, so a document changed since
    /// the scan is left alone. A failing rule is logged and the remaining rules still run.
    pub async fn sweep(
        &self,
        now: DateTime<Utc>,
        rules: &RuleSet,
        source: Option<&str>,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        debug!(now = %now, "Running lifecycle trigger sweep");

        for query in trigger_queries(now, rules) {
            if let Some(source) = source {
                if !query.rule.sources.iter().any(|s| s == source) {
                    continue;
                }
            }
            self.run_query(&query, now, &mut report).await;
        }

        info!(
            transitions = report.transitions.len(),
            failures = report.failures.len(),
            "Lifecycle trigger sweep completed"
        );
        report
    }

    async fn run_query(&self, query: &TriggerQuery, now: DateTime<Utc>, report: &mut SweepReport) {
        let sources = query.rule.sources.join(",");
        let matches = match self.entities.find(&query.filter).await {
            Ok(matches) => matches,
            Err(e) => {
                error!(sources = %sources, rule = %query.origin, error = %e, "Lifecycle trigger query failed");
                report.failures.push(SweepFailure {
                    origin: query.origin.clone(),
                    sources: query.rule.sources.clone(),
                    entity_id: None,
                    message: e.to_string(),
                });
                return;
            }
        };
        info!(
            sources = %sources,
            rule = %query.origin,
            count = matches.len(),
            "Found identities to process for trigger"
        );

        for entity in matches {
            let id = entity.id();
            let guard = query.filter.clone().id_eq(id);
            match self.entities.find_one_and_update(&guard, &query.update).await {
                Ok(Some(updated)) => {
                    let target = &query.rule.target;
                    if let Err(e) = self.history.record(updated.id(), target, now).await {
                        warn!(entity = %id, lifecycle = %target, error = %e, "Failed to record lifecycle transition");
                    }
                    info!(
                        entity = %id,
                        sources = %sources,
                        to = %target,
                        "Identity lifecycle updated by trigger"
                    );
                    report.transitions.push(AppliedTransition {
                        entity_id: id.to_string(),
                        from: entity.lifecycle().unwrap_or_default().to_string(),
                        to: target.clone(),
                        origin: query.origin.clone(),
                        at: now,
                    });
                }
                Ok(None) => {
                    debug!(entity = %id, rule = %query.origin, "Entity changed since selection, skipped");
                }
                Err(e) => {
                    error!(entity = %id, sources = %sources, error = %e, "Lifecycle trigger update failed");
                    report.failures.push(SweepFailure {
                        origin: query.origin.clone(),
                        sources: query.rule.sources.clone(),
                        entity_id: Some(id.to_string()),
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}
