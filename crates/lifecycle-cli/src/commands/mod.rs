//! CLI command implementations.

pub mod check;
pub mod execute;
pub mod init;
pub mod list;
pub mod serve;
pub mod states;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use lifecycle_core::Entity;
use lifecycle_engine::{
    HistoryStore, JsonlHistoryStore, LifecycleEngine, MemoryEntityStore, MemoryHistoryStore,
};
use tracing::info;

use crate::config::Config;

/// Engine for commands that only read configuration: empty entity store, in-memory history.
pub(crate) fn config_only_engine(config: &Config) -> LifecycleEngine {
    LifecycleEngine::new(
        config.engine_config(),
        Arc::new(MemoryEntityStore::new()),
        Arc::new(MemoryHistoryStore::new()),
    )
}

/// Open the configured append-only history file.
pub(crate) fn open_history(config: &Config) -> Result<Arc<dyn HistoryStore>> {
    let store = JsonlHistoryStore::open(&config.history_file).with_context(|| {
        format!(
            "Failed to open history file {}",
            config.history_file.display()
        )
    })?;
    Ok(Arc::new(store))
}

/// Read a JSON array of entity documents.
pub(crate) fn read_seed(path: &Path) -> Result<Vec<Entity>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    let entities: Vec<Entity> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse seed file {}", path.display()))?;
    Ok(entities)
}

/// Load `path` into `store` without publishing change events.
pub(crate) async fn seed_store(store: &MemoryEntityStore, path: &Path) -> Result<usize> {
    let entities = read_seed(path)?;
    let count = entities.len();
    for entity in entities {
        store.insert(entity).await;
    }
    info!(count, file = %path.display(), "Entity store seeded");
    Ok(count)
}

/// Write every document of `store` back to `path` as a JSON array.
pub(crate) async fn write_seed(store: &MemoryEntityStore, path: &Path) -> Result<()> {
    let entities = store.all().await;
    let contents = serde_json::to_string_pretty(&entities)?;
    std::fs::write(path, contents)
        .with_context(|| format!("Failed to write seed file {}", path.display()))?;
    Ok(())
}
