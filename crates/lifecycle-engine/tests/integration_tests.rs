//! Integration tests for lifecycle-engine using isolated on-disk configuration fixtures.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration as StdDuration, SystemTime};

use chrono::{Duration, Utc};
use lifecycle_core::{format_timestamp, Entity, Page, Update, DEFAULT_DATE_KEY};
use lifecycle_engine::{
    spawn_event_loop, Clock, EngineConfig, EngineError, EntityStore, FixedClock, LifecycleEngine,
    MemoryEntityStore, MemoryHistoryStore, RecordingNotifier,
};
use tempfile::TempDir;
use tokio::sync::mpsc;

// ============================================================================
// Fixtures
// ============================================================================

/// A throwaway configuration directory plus an engine wired to in-memory stores.
struct Fixture {
    _tmp: TempDir,
    config_dir: PathBuf,
    entities: Arc<MemoryEntityStore>,
    history: Arc<MemoryHistoryStore>,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<FixedClock>,
    engine: Arc<LifecycleEngine>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_entities(MemoryEntityStore::new())
    }

    fn with_entities(entities: MemoryEntityStore) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let config_dir = tmp.path().join("configs");
        fs::create_dir_all(config_dir.join("rules")).unwrap();

        let entities = Arc::new(entities);
        let history = Arc::new(MemoryHistoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let engine = Arc::new(
            LifecycleEngine::new(
                EngineConfig::with_config_dir(&config_dir),
                entities.clone(),
                history.clone(),
            )
            .with_notifier(notifier.clone())
            .with_clock(clock.clone()),
        );

        Self {
            _tmp: tmp,
            config_dir,
            entities,
            history,
            notifier,
            clock,
            engine,
        }
    }

    fn rule_file(&self, name: &str, yaml: &str) -> PathBuf {
        let path = self.config_dir.join("rules").join(name);
        fs::write(&path, yaml).unwrap();
        path
    }

    fn states_file(&self, yaml: &str) -> PathBuf {
        let path = self.config_dir.join("states.yml");
        fs::write(&path, yaml).unwrap();
        path
    }
}

/// Move a file's modification time forward without touching its content.
fn touch(path: &Path, secs_ahead: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + StdDuration::from_secs(secs_ahead))
        .unwrap();
}

const OFFICIAL_IT_TO_MANUAL: &str = "\
identities:
  - sources: [OFFICIAL]
    rules:
      department: IT
    target: MANUAL
";

const ARCHIVE_AFTER_90_DAYS: &str = "\
identities:
  - sources: [OFFICIAL]
    trigger: 90d
    target: ARCHIVED
";

// ============================================================================
// Loading and caching
// ============================================================================

#[test]
fn source_index_follows_file_then_definition_order() {
    let fx = Fixture::new();
    fx.rule_file(
        "20-late.yml",
        "identities:\n  - sources: [O]\n    target: W\n    trigger: 5\n",
    );
    fx.rule_file(
        "10-early.yml",
        "identities:\n  - sources: [O, A]\n    target: M\n    rules: { a: 1 }\n  - sources: [O]\n    target: I\n    rules: { b: 2 }\n",
    );

    let snapshot = fx.engine.refresh().unwrap();
    let order: Vec<_> = snapshot
        .index
        .candidates("O")
        .iter()
        .map(|r| r.origin.to_string())
        .collect();
    assert_eq!(order, vec!["10-early.yml#0", "10-early.yml#1", "20-late.yml#0"]);
    assert_eq!(snapshot.index.candidates("A").len(), 1);
}

#[test]
fn custom_states_extend_the_builtin_list() {
    let fx = Fixture::new();
    fx.states_file(
        "states:\n  - key: Y\n    label: Why\n    description: first\n  - key: Z\n    label: Zed\n    description: second\n",
    );

    fx.engine.refresh().unwrap();
    let all = fx.engine.list_all_states();
    assert_eq!(all.len(), lifecycle_core::BuiltinState::ALL.len() + 2);
    assert_eq!(fx.engine.list_custom_keys(), vec!["Y", "Z"]);
    assert!(fx.engine.state_file_modified_ms() > 0);
}

#[test]
fn loaders_reparse_only_when_signature_changes() {
    let fx = Fixture::new();
    let rules = fx.rule_file("rules.yml", OFFICIAL_IT_TO_MANUAL);
    fx.states_file("states:\n  - key: Z\n    label: Zed\n    description: custom\n");

    let first = fx.engine.refresh().unwrap();
    fx.engine.refresh().unwrap();
    fx.engine.refresh().unwrap();
    assert_eq!(fx.engine.rule_loader().parse_count(), 1);
    assert_eq!(fx.engine.state_loader().parse_count(), 1);

    // Same content, new modification time: reparse and rebuild.
    touch(&rules, 10);
    let second = fx.engine.refresh().unwrap();
    assert_eq!(fx.engine.rule_loader().parse_count(), 2);
    assert!(!Arc::ptr_eq(&first.index, &second.index));
    assert_eq!(first.index, second.index);
}

#[test]
fn freshness_gate_skips_loaders_within_ttl() {
    let fx = Fixture::new();
    let rules = fx.rule_file("rules.yml", OFFICIAL_IT_TO_MANUAL);

    fx.engine.ensure_fresh();
    touch(&rules, 10);
    fx.engine.ensure_fresh();
    assert_eq!(fx.engine.rule_loader().parse_count(), 1);

    fx.clock.advance(Duration::seconds(61));
    fx.engine.ensure_fresh();
    assert_eq!(fx.engine.rule_loader().parse_count(), 2);
}

#[test]
fn invalid_rule_file_keeps_last_good_snapshot() {
    let fx = Fixture::new();
    let path = fx.rule_file("rules.yml", OFFICIAL_IT_TO_MANUAL);
    fx.engine.refresh().unwrap();

    fs::write(&path, "identities:\n  - sources: [O]\n    target: M\n    trigger: 10h\n").unwrap();
    touch(&path, 10);
    let err = fx.engine.refresh().unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
    assert!(err.to_string().contains("identities[0].trigger"));

    // Readers still see the previous rule.
    assert_eq!(fx.engine.source_index().candidates("O").len(), 1);
    assert_eq!(fx.engine.view().index.candidates("O")[0].rule.target, "M");
}

#[test]
fn builtin_key_clash_is_rejected_and_previous_states_remain() {
    let fx = Fixture::new();
    let path = fx.states_file("states:\n  - key: Y\n    label: Why\n    description: ok\n");
    fx.engine.refresh().unwrap();

    fs::write(&path, "states:\n  - key: O\n    label: Other\n    description: clash\n").unwrap();
    touch(&path, 10);
    let err = fx.engine.refresh().unwrap_err();
    assert!(err.to_string().contains("'O'"), "{err}");
    assert_eq!(fx.engine.list_custom_keys(), vec!["Y"]);
}

#[test]
fn builtin_key_clash_without_previous_catalog_leaves_no_custom_states() {
    let fx = Fixture::new();
    fx.states_file("states:\n  - key: O\n    label: Other\n    description: clash\n");

    assert!(fx.engine.refresh().is_err());
    assert!(fx.engine.list_custom_states().is_empty());
    assert_eq!(
        fx.engine.list_all_states().len(),
        lifecycle_core::BuiltinState::ALL.len()
    );
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn official_it_identity_cascades_to_manual() {
    let (tx, rx) = mpsc::unbounded_channel();
    let fx = Fixture::with_entities(MemoryEntityStore::new().with_events(tx));
    fx.rule_file("rules.yml", OFFICIAL_IT_TO_MANUAL);
    fx.engine.refresh().unwrap();
    let events = spawn_event_loop(fx.engine.clone(), rx);

    fx.entities
        .insert(Entity::new("u1").with("lifecycle", "A").with("department", "IT"))
        .await;
    fx.entities
        .update("u1", &Update::new().set("lifecycle", "O"))
        .await
        .unwrap();

    for _ in 0..200 {
        if fx.history.len().await >= 2 {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }

    let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
    assert_eq!(stored.lifecycle(), Some("M"));

    let states: Vec<_> = fx
        .history
        .entries()
        .await
        .into_iter()
        .map(|e| e.lifecycle)
        .collect();
    assert_eq!(states, vec!["O", "M"]);
    assert_eq!(fx.notifier.calls(), vec![vec!["u1".to_string()]]);

    events.abort();
}

#[tokio::test]
async fn ignored_identity_is_skipped_by_dispatch_and_sweep() {
    let fx = Fixture::new();
    fx.rule_file("10-rules.yml", OFFICIAL_IT_TO_MANUAL);
    fx.rule_file("20-archive.yml", ARCHIVE_AFTER_90_DAYS);
    let now = fx.clock.now();

    let before = Entity::new("u1")
        .with("lifecycle", "A")
        .with("department", "IT")
        .with("ignoreLifecycle", true)
        .with(DEFAULT_DATE_KEY, format_timestamp(now - Duration::days(200)));
    let after = before.clone().with("lifecycle", "O");
    fx.entities.insert(after.clone()).await;

    let report = fx.engine.dispatch(Some(&before), &after).await;
    assert!(report.transition.is_none());

    let sweep = fx.engine.run_sweep(now).await;
    assert!(sweep.transitions.is_empty());

    let stored = fx.entities.find_by_id("u1").await.unwrap().unwrap();
    assert_eq!(stored.lifecycle(), Some("O"));
    assert!(fx.notifier.calls().is_empty());
}

// ============================================================================
// Sweep
// ============================================================================

#[tokio::test]
async fn aged_official_identity_is_archived_by_sweep() {
    let fx = Fixture::new();
    fx.rule_file("archive.yml", ARCHIVE_AFTER_90_DAYS);
    let now = fx.clock.now();
    fx.entities
        .insert(
            Entity::new("old")
                .with("lifecycle", "O")
                .with(DEFAULT_DATE_KEY, format_timestamp(now - Duration::days(91))),
        )
        .await;
    fx.entities
        .insert(
            Entity::new("recent")
                .with("lifecycle", "O")
                .with(DEFAULT_DATE_KEY, format_timestamp(now - Duration::days(30))),
        )
        .await;

    let report = fx.engine.run_sweep(now).await;

    assert_eq!(report.transitions.len(), 1);
    let old = fx.entities.find_by_id("old").await.unwrap().unwrap();
    assert_eq!(old.lifecycle(), Some("X"));
    assert_eq!(
        old.get(DEFAULT_DATE_KEY).and_then(|v| v.as_str()),
        Some(format_timestamp(now).as_str())
    );
    let recent = fx.entities.find_by_id("recent").await.unwrap().unwrap();
    assert_eq!(recent.lifecycle(), Some("O"));

    let history = fx.engine.history_for("old", Page::default()).await;
    assert_eq!(history.total, 1);
    assert_eq!(history.data[0].lifecycle, "X");
}

#[tokio::test]
async fn sweep_picks_up_rule_files_added_after_startup() {
    let fx = Fixture::new();
    fx.engine.refresh().unwrap();
    let now = fx.clock.now();
    fx.entities
        .insert(
            Entity::new("old")
                .with("lifecycle", "O")
                .with(DEFAULT_DATE_KEY, format_timestamp(now - Duration::days(91))),
        )
        .await;

    assert!(fx.engine.run_sweep(now).await.transitions.is_empty());

    fx.rule_file("archive.yml", ARCHIVE_AFTER_90_DAYS);
    assert_eq!(fx.engine.run_sweep(now).await.transitions.len(), 1);
}
