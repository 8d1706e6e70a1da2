//! The engine facade: loaders, current configuration snapshot, and the collaborators the
//! dispatcher and sweep write to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifecycle_core::{
    Entity, HistoryEntry, LifecycleStat, LifecycleState, Page, Paged, RuleSet, StateCatalog,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::cache::ConfigCache;
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::dispatcher::{DispatchReport, Dispatcher};
use crate::error::EngineResult;
use crate::freshness::FreshnessGate;
use crate::history::HistoryStore;
use crate::index::SourceIndex;
use crate::loader::{RuleLoader, StateLoader};
use crate::ports::{BackendNotifier, EntityChangeHandler, EntityStore, TracingNotifier};
use crate::scheduler::SweepTarget;
use crate::sweep::{SweepReport, Sweeper};

/// One consistent view of the configuration: the state catalog, the rule set validated against
/// it, and the source index built from those rules.
#[derive(Debug, Clone, Default)]
pub struct EngineSnapshot {
    pub states: Arc<StateCatalog>,
    pub rules: Arc<RuleSet>,
    pub index: Arc<SourceIndex>,
}

/// Rule-driven lifecycle engine.
///
/// The engine serves the last successfully loaded [`EngineSnapshot`]. [`refresh`](Self::refresh)
/// asks both loaders to re-check their files; a refresh that fails leaves the previous snapshot
/// in place.
pub struct LifecycleEngine {
    config: EngineConfig,
    state_loader: StateLoader,
    rule_loader: RuleLoader,
    snapshot: RwLock<Arc<EngineSnapshot>>,
    entities: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn BackendNotifier>,
    clock: Arc<dyn Clock>,
    freshness: FreshnessGate,
}

impl LifecycleEngine {
    /// Engine with fresh caches, the system clock and a logging backend notifier.
    pub fn new(
        config: EngineConfig,
        entities: Arc<dyn EntityStore>,
        history: Arc<dyn HistoryStore>,
    ) -> Self {
        let state_loader = StateLoader::new(config.states_file(), Arc::new(ConfigCache::new()));
        let rule_loader = RuleLoader::new(config.rules_dir(), Arc::new(ConfigCache::new()));
        let freshness = FreshnessGate::new(config.freshness_ttl());
        Self {
            config,
            state_loader,
            rule_loader,
            snapshot: RwLock::new(Arc::new(EngineSnapshot::default())),
            entities,
            history,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            freshness,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn BackendNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use externally owned caches, e.g. shared with another engine instance in the same process.
    pub fn with_caches(
        mut self,
        states: Arc<ConfigCache<StateCatalog>>,
        rules: Arc<ConfigCache<RuleSet>>,
    ) -> Self {
        self.state_loader = StateLoader::new(self.config.states_file(), states);
        self.rule_loader = RuleLoader::new(self.config.rules_dir(), rules);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn entities(&self) -> &Arc<dyn EntityStore> {
        &self.entities
    }

    pub fn history(&self) -> &Arc<dyn HistoryStore> {
        &self.history
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn state_loader(&self) -> &StateLoader {
        &self.state_loader
    }

    pub fn rule_loader(&self) -> &RuleLoader {
        &self.rule_loader
    }

    /// The snapshot currently served, without touching the filesystem.
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    // =========================================================================
    // Configuration refresh
    // =========================================================================

    /// Re-check both configuration sources and publish a new snapshot.
    ///
    /// Files whose signature is unchanged are not reparsed. A changed state catalog forces the
    /// rules to be revalidated against it. The index is rebuilt only when the rule set changed.
    pub fn refresh(&self) -> EngineResult<Arc<EngineSnapshot>> {
        let current = self.snapshot();

        let states = self.state_loader.load()?;
        if !Arc::ptr_eq(&states, &current.states) {
            self.rule_loader.invalidate();
        }
        let rules = self.rule_loader.load(&states)?;
        let index = if Arc::ptr_eq(&rules, &current.rules) {
            Arc::clone(&current.index)
        } else {
            debug!(rules = rules.rule_count(), "Rebuilding lifecycle source index");
            Arc::new(SourceIndex::build(&rules))
        };

        let next = Arc::new(EngineSnapshot {
            states,
            rules,
            index,
        });
        *self.snapshot.write() = Arc::clone(&next);
        self.freshness.mark_refreshed(self.clock.now());
        debug!(sources = next.index.len(), "Lifecycle cache refreshed (sources, states, rules)");
        Ok(next)
    }

    /// Refresh, falling back to the current snapshot when the refresh fails.
    pub fn view(&self) -> Arc<EngineSnapshot> {
        match self.refresh() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Lifecycle configuration refresh failed, serving last good configuration");
                self.snapshot()
            }
        }
    }

    /// Refresh only when the last successful refresh is older than the freshness TTL.
    pub fn ensure_fresh(&self) -> Arc<EngineSnapshot> {
        let refreshed = self
            .freshness
            .ensure_fresh(self.clock.now(), || self.refresh().map(|_| ()));
        match refreshed {
            Ok(true) => debug!(ttl_secs = self.config.freshness_ttl_secs, "Lifecycle cache ensured"),
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Lifecycle configuration refresh failed, serving last good configuration")
            }
        }
        self.snapshot()
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.entities),
            Arc::clone(&self.history),
            Arc::clone(&self.notifier),
            Arc::clone(&self.clock),
        )
    }

    fn sweeper(&self) -> Sweeper {
        Sweeper::new(Arc::clone(&self.entities), Arc::clone(&self.history))
    }

    /// Evaluate the event-driven rules for one entity change.
    pub async fn dispatch(&self, before: Option<&Entity>, after: &Entity) -> DispatchReport {
        let snapshot = self.view();
        self.dispatcher().dispatch(&snapshot.index, before, after).await
    }

    /// Refresh configuration, then apply every time-triggered rule as of `now`.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let snapshot = self.view();
        self.sweeper().sweep(now, &snapshot.rules, None).await
    }

    /// Like [`run_sweep`](Self::run_sweep), restricted to rules listing `source`.
    pub async fn sweep_source(&self, now: DateTime<Utc>, source: &str) -> SweepReport {
        let snapshot = self.view();
        self.sweeper().sweep(now, &snapshot.rules, Some(source)).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Built-in states followed by custom states.
    pub fn list_all_states(&self) -> Vec<LifecycleState> {
        self.snapshot().states.all_states()
    }

    pub fn list_custom_states(&self) -> Vec<LifecycleState> {
        self.snapshot().states.custom_states().to_vec()
    }

    pub fn list_custom_keys(&self) -> Vec<String> {
        self.snapshot()
            .states
            .custom_keys()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Modification time of the state catalog the current snapshot was loaded from.
    pub fn state_file_modified_ms(&self) -> u64 {
        self.snapshot().states.modified_ms()
    }

    pub fn source_index(&self) -> Arc<SourceIndex> {
        Arc::clone(&self.snapshot().index)
    }

    /// History of one entity, newest first. Store failures yield an empty page.
    pub async fn history_for(&self, ref_id: &str, page: Page) -> Paged<HistoryEntry> {
        self.history
            .history_for(ref_id, page)
            .await
            .unwrap_or_else(|e| {
                warn!(ref_id, error = %e, "Failed to read lifecycle history");
                Paged::empty()
            })
    }

    /// Transition counts per reached state. Store failures yield no stats.
    pub async fn stats(&self) -> Vec<LifecycleStat> {
        self.history.stats().await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read lifecycle stats");
            Vec::new()
        })
    }

    /// Recent transitions across all entities, newest first. Store failures yield an empty page.
    pub async fn recent(&self, page: Page) -> Paged<HistoryEntry> {
        self.history.recent(page).await.unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read recent lifecycle changes");
            Paged::empty()
        })
    }
}

#[async_trait]
impl EntityChangeHandler for LifecycleEngine {
    async fn on_entity_changed(&self, before: Option<&Entity>, after: &Entity) {
        let report = self.dispatch(before, after).await;
        debug!(
            entity = %after.id(),
            manual_recorded = report.manual_recorded,
            transitioned = report.transition.is_some(),
            "Entity change handled"
        );
    }
}

#[async_trait]
impl SweepTarget for LifecycleEngine {
    async fn tick(&self, now: DateTime<Utc>) {
        self.run_sweep(now).await;
    }
}
