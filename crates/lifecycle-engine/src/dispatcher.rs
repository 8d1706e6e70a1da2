//! Cascading rule evaluation on entity change.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use lifecycle_core::{
    format_timestamp, Entity, Filter, LifecycleRule, RuleOrigin, Update, DEFAULT_DATE_KEY,
    LIFECYCLE_FIELD,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::history::HistoryStore;
use crate::index::SourceIndex;
use crate::ports::{BackendNotifier, EntityStore};

/// A rule-driven state change that was applied to one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedTransition {
    pub entity_id: String,
    pub from: String,
    pub to: String,
    pub origin: RuleOrigin,
    pub at: DateTime<Utc>,
}

/// Outcome of dispatching one change event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    /// A history entry was written for a state change made outside the engine.
    pub manual_recorded: bool,
    /// The automatic transition applied, if any rule matched.
    pub transition: Option<AppliedTransition>,
}

/// The `$set` applied by a firing rule: its mutation, the target state and the fresh timestamp.
pub(crate) fn transition_update(rule: &LifecycleRule, now: DateTime<Utc>) -> Update {
    let stamp = format_timestamp(now);
    Update::new()
        .merge(&rule.mutation())
        .set(LIFECYCLE_FIELD, rule.target.clone())
        .set(DEFAULT_DATE_KEY, stamp.clone())
        .set(rule.date_key.clone(), stamp)
}

/// Evaluates event-driven (non-trigger) rules against changed entities.
pub struct Dispatcher {
    entities: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn BackendNotifier>,
    clock: Arc<dyn Clock>,
}

impl Dispatcher {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn BackendNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entities,
            history,
            notifier,
            clock,
        }
    }

    /// React to one change of one entity.
    ///
    /// 1. A lifecycle change made outside the engine is recorded in history.
    /// 2. The candidates for the entity's current state are tried in order, skipping
    ///    time-triggered rules. Each attempt is a single conditional update guarded by the
    ///    rule's filter, the entity id and the ignore flag.
    /// 3. The first rule that matches is applied, recorded and notified; evaluation stops.
    ///    The rules of the state just reached are not evaluated for this event.
    ///
    /// Store failures on one rule are logged and the next rule is tried.
    pub async fn dispatch(
        &self,
        index: &SourceIndex,
        before: Option<&Entity>,
        after: &Entity,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();
        let id = after.id();
        let Some(current) = after.lifecycle() else {
            debug!(entity = %id, "Entity has no lifecycle, nothing to dispatch");
            return report;
        };

        let changed = before.map_or(true, |b| b.lifecycle() != Some(current));
        if changed {
            match self.history.record(id, current, self.clock.now()).await {
                Ok(_) => {
                    report.manual_recorded = true;
                    debug!(entity = %id, lifecycle = %current, "Lifecycle change manually recorded");
                }
                Err(e) => warn!(entity = %id, lifecycle = %current, error = %e, "Failed to record lifecycle change"),
            }
        }

        let candidates = index.candidates(current);
        if candidates.is_empty() {
            return report;
        }
        debug!(entity = %id, source = %current, candidates = candidates.len(), "Evaluating lifecycle rules");

        for indexed in candidates {
            if indexed.rule.is_time_triggered() {
                debug!(source = %current, rule = %indexed.origin, "Skipping time-triggered rule");
                continue;
            }

            let now = self.clock.now();
            let filter = indexed
                .rule
                .filter()
                .and(&Filter::new().id_eq(id).not_ignoring_lifecycle());
            let update = transition_update(&indexed.rule, now);

            let updated = match self.entities.find_one_and_update(&filter, &update).await {
                Ok(Some(updated)) => updated,
                Ok(None) => {
                    debug!(entity = %id, source = %current, rule = %indexed.origin, "Rule did not match");
                    continue;
                }
                Err(e) => {
                    warn!(
                        entity = %id,
                        source = %current,
                        rule = %indexed.origin,
                        error = %e,
                        "Lifecycle rule evaluation failed"
                    );
                    continue;
                }
            };

            let target = &indexed.rule.target;
            if let Err(e) = self.history.record(updated.id(), target, now).await {
                warn!(entity = %id, lifecycle = %target, error = %e, "Failed to record lifecycle transition");
            }
            if let Err(e) = self
                .notifier
                .notify_lifecycle_changed(&[updated.id().to_string()])
                .await
            {
                warn!(entity = %id, error = %e, "Backend notification failed");
            }

            info!(
                entity = %id,
                source = %current,
                to = %target,
                rule = %indexed.origin,
                "Identity lifecycle updated by rule"
            );
            report.transition = Some(AppliedTransition {
                entity_id: updated.id().to_string(),
                from: current.to_string(),
                to: target.clone(),
                origin: indexed.origin.clone(),
                at: now,
            });
            break;
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::{EngineError, EngineResult};
    use crate::history::MemoryHistoryStore;
    use crate::ports::{MemoryEntityStore, RecordingNotifier};
    use async_trait::async_trait;
    use lifecycle_core::{Condition, Page, RuleFile, RuleSet, Trigger};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        entities: Arc<MemoryEntityStore>,
        history: Arc<MemoryHistoryStore>,
        notifier: Arc<RecordingNotifier>,
        dispatcher: Dispatcher,
    }

    fn fixture() -> Fixture {
        let entities = Arc::new(MemoryEntityStore::new());
        let history = Arc::new(MemoryHistoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let dispatcher = Dispatcher::new(
            entities.clone(),
            history.clone(),
            notifier.clone(),
            clock,
        );
        Fixture {
            entities,
            history,
            notifier,
            dispatcher,
        }
    }

    fn index(rules: Vec<LifecycleRule>) -> SourceIndex {
        SourceIndex::build(&RuleSet::new(vec![RuleFile {
            name: "rules.yml".into(),
            rules: rules.into_iter().map(Arc::new).collect(),
        }]))
    }

    fn it_rule(target: &str) -> LifecycleRule {
        LifecycleRule::new(["O"], target)
            .with_rules(Filter::new().with("department", Condition::Eq("IT".into())))
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let fx = fixture();
        let index = index(vec![
            LifecycleRule::new(["O"], "W")
                .with_rules(Filter::new().with("department", Condition::Eq("HR".into()))),
            it_rule("M").with_mutation(Update::new().set("flagged", true)),
            it_rule("X"),
        ]);
        let before = Entity::new("u1").with("lifecycle", "A").with("department", "IT");
        let after = before.clone().with("lifecycle", "O");
        fx.entities.insert(after.clone()).await;

        let report = fx.dispatcher.dispatch(&index, Some(&before), &after).await;

        assert!(report.manual_recorded);
        let transition = report.transition.unwrap();
        assert_eq!(transition.to, "M");
        assert_eq!(transition.origin.position, 1);

        let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(stored.lifecycle(), Some("M"));
        assert_eq!(stored.get("flagged"), Some(&serde_json::Value::Bool(true)));
        assert!(stored.timestamp(DEFAULT_DATE_KEY).is_some());

        let history = fx.history.history_for("u1", Page::default()).await.unwrap();
        let states: Vec<_> = history.data.iter().map(|e| e.lifecycle.as_str()).collect();
        assert_eq!(states, vec!["M", "O"]);
        assert_eq!(fx.notifier.calls(), vec![vec!["u1".to_string()]]);
    }

    #[tokio::test]
    async fn test_unchanged_lifecycle_is_not_recorded() {
        let fx = fixture();
        let entity = Entity::new("u1").with("lifecycle", "O").with("department", "HR");
        fx.entities.insert(entity.clone()).await;

        let report = fx
            .dispatcher
            .dispatch(&index(vec![it_rule("M")]), Some(&entity), &entity)
            .await;

        assert_eq!(report, DispatchReport::default());
        assert!(fx.history.is_empty().await);
        assert!(fx.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn test_time_triggered_rules_are_skipped() {
        let fx = fixture();
        let entity = Entity::new("u1").with("lifecycle", "O");
        fx.entities.insert(entity.clone()).await;
        let index = index(vec![LifecycleRule::new(["O"], "X")
            .with_trigger(Trigger::from_secs(1).unwrap())]);

        let report = fx.dispatcher.dispatch(&index, None, &entity).await;

        assert!(report.manual_recorded);
        assert!(report.transition.is_none());
        let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(stored.lifecycle(), Some("O"));
    }

    #[tokio::test]
    async fn test_ignored_entity_is_never_transitioned() {
        let fx = fixture();
        let before = Entity::new("u1")
            .with("lifecycle", "A")
            .with("department", "IT")
            .with("ignoreLifecycle", true);
        let after = before.clone().with("lifecycle", "O");
        fx.entities.insert(after.clone()).await;

        let report = fx
            .dispatcher
            .dispatch(&index(vec![it_rule("M")]), Some(&before), &after)
            .await;

        assert!(report.transition.is_none());
        assert_eq!(fx.history.len().await, 1);
        assert!(fx.notifier.calls().is_empty());
    }

    /// Fails the first conditional update, then delegates.
    struct FailFirstUpdate {
        inner: Arc<MemoryEntityStore>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl EntityStore for FailFirstUpdate {
        async fn find(&self, filter: &Filter) -> EngineResult<Vec<Entity>> {
            self.inner.find(filter).await
        }

        async fn find_one_and_update(
            &self,
            filter: &Filter,
            update: &Update,
        ) -> EngineResult<Option<Entity>> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(EngineError::Store("write conflict".into()));
            }
            self.inner.find_one_and_update(filter, update).await
        }

        async fn find_by_id(&self, id: &str) -> EngineResult<Option<Entity>> {
            self.inner.find_by_id(id).await
        }
    }

    #[tokio::test]
    async fn test_store_error_on_one_rule_moves_on_to_the_next() {
        let fx = fixture();
        let store = Arc::new(FailFirstUpdate {
            inner: fx.entities.clone(),
            failed: AtomicBool::new(false),
        });
        let dispatcher = Dispatcher::new(
            store,
            fx.history.clone(),
            fx.notifier.clone(),
            Arc::new(FixedClock::new(Utc::now())),
        );
        let index = index(vec![it_rule("W"), it_rule("M")]);
        let before = Entity::new("u1").with("lifecycle", "A").with("department", "IT");
        let after = before.clone().with("lifecycle", "O");
        fx.entities.insert(after.clone()).await;

        let report = dispatcher.dispatch(&index, Some(&before), &after).await;

        let transition = report.transition.unwrap();
        assert_eq!(transition.to, "M");
        assert_eq!(transition.origin.position, 1);
        let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(stored.lifecycle(), Some("M"));

        let history = fx.history.history_for("u1", Page::default()).await.unwrap();
        let states: Vec<_> = history.data.iter().map(|e| e.lifecycle.as_str()).collect();
        assert_eq!(states, vec!["M", "O"]);
        assert_eq!(fx.notifier.calls(), vec![vec!["u1".to_string()]]);
    }

    #[tokio::test]
    async fn test_single_hop_per_event() {
        let fx = fixture();
        let index = index(vec![
            it_rule("M"),
            LifecycleRule::new(["M"], "X")
                .with_rules(Filter::new().with("department", Condition::Eq("IT".into()))),
        ]);
        let before = Entity::new("u1").with("lifecycle", "A").with("department", "IT");
        let after = before.clone().with("lifecycle", "O");
        fx.entities.insert(after.clone()).await;

        fx.dispatcher.dispatch(&index, Some(&before), &after).await;

        let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
        assert_eq!(stored.lifecycle(), Some("M"));
    }
}
