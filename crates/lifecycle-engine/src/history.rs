//! Append-only transition history.
//!
//! ## Storage
//!
//! [`JsonlHistoryStore`] keeps one JSON object per line:
//!
//! ```text
//! {"id":"…","refId":"u1","lifecycle":"O","date":"2024-05-01T10:00:00Z","createdAt":"…"}
//! {"id":"…","refId":"u1","lifecycle":"M","date":"2024-05-01T10:00:00Z","createdAt":"…"}
//! ```
//!
//! The file is replayed into memory on open and only ever appended to afterwards.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lifecycle_core::{HistoryEntry, LifecycleStat, Page, Paged};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Writer and reader of transition records. Reads never mutate.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append one record.
    async fn record(
        &self,
        ref_id: &str,
        lifecycle: &str,
        date: DateTime<Utc>,
    ) -> EngineResult<HistoryEntry>;

    /// Records of one entity, newest first.
    async fn history_for(&self, ref_id: &str, page: Page) -> EngineResult<Paged<HistoryEntry>>;

    /// Record counts per reached state, sorted by state key.
    async fn stats(&self) -> EngineResult<Vec<LifecycleStat>>;

    /// Records of every entity, newest first.
    async fn recent(&self, page: Page) -> EngineResult<Paged<HistoryEntry>>;
}

/// Newest first by `created_at`; among equal timestamps the later insert comes first.
fn newest_first<'a>(entries: impl DoubleEndedIterator<Item = &'a HistoryEntry>) -> Vec<HistoryEntry> {
    let mut sorted: Vec<HistoryEntry> = entries.rev().cloned().collect();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sorted
}

fn count_by_lifecycle(entries: &[HistoryEntry]) -> Vec<LifecycleStat> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.lifecycle.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(lifecycle, count)| LifecycleStat {
            lifecycle: lifecycle.to_string(),
            count,
        })
        .collect()
}

// =============================================================================
// In-memory store
// =============================================================================

/// History kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Every record in insertion order.
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record(
        &self,
        ref_id: &str,
        lifecycle: &str,
        date: DateTime<Utc>,
    ) -> EngineResult<HistoryEntry> {
        let entry = HistoryEntry::new(ref_id, lifecycle, date);
        self.entries.write().await.push(entry.clone());
        debug!(ref_id, lifecycle, "Recorded lifecycle transition");
        Ok(entry)
    }

    async fn history_for(&self, ref_id: &str, page: Page) -> EngineResult<Paged<HistoryEntry>> {
        let entries = self.entries.read().await;
        let sorted = newest_first(entries.iter().filter(|e| e.ref_id == ref_id));
        Ok(page.apply(sorted))
    }

    async fn stats(&self) -> EngineResult<Vec<LifecycleStat>> {
        Ok(count_by_lifecycle(&self.entries.read().await))
    }

    async fn recent(&self, page: Page) -> EngineResult<Paged<HistoryEntry>> {
        let entries = self.entries.read().await;
        Ok(page.apply(newest_first(entries.iter())))
    }
}

// =============================================================================
// JSON-lines store
// =============================================================================

/// History persisted to an append-only JSON-lines file.
#[derive(Debug)]
pub struct JsonlHistoryStore {
    path: PathBuf,
    memory: MemoryHistoryStore,
}

impl JsonlHistoryStore {
    /// Open (or create) the history file and replay it. Malformed lines are skipped.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| EngineError::io(parent, e))?;
        }

        let mut entries = Vec::new();
        if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| EngineError::io(&path, e))?;
            for (line_no, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<HistoryEntry>(line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => warn!(
                        path = %path.display(),
                        line = line_no + 1,
                        error = %e,
                        "Skipping malformed history line"
                    ),
                }
            }
        }

        info!(path = %path.display(), entries = entries.len(), "Opened lifecycle history");
        Ok(Self {
            path,
            memory: MemoryHistoryStore {
                entries: RwLock::new(entries),
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &HistoryEntry) -> EngineResult<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::io(&self.path, e))?;
        writeln!(file, "{line}").map_err(|e| EngineError::io(&self.path, e))
    }
}

#[async_trait]
impl HistoryStore for JsonlHistoryStore {
    async fn record(
        &self,
        ref_id: &str,
        lifecycle: &str,
        date: DateTime<Utc>,
    ) -> EngineResult<HistoryEntry> {
        let entry = HistoryEntry::new(ref_id, lifecycle, date);
        // Hold the write lock across the append so file order matches memory order.
        let mut entries = self.memory.entries.write().await;
        self.append(&entry)?;
        entries.push(entry.clone());
        debug!(ref_id, lifecycle, "Recorded lifecycle transition");
        Ok(entry)
    }

    async fn history_for(&self, ref_id: &str, page: Page) -> EngineResult<Paged<HistoryEntry>> {
        self.memory.history_for(ref_id, page).await
    }

    async fn stats(&self) -> EngineResult<Vec<LifecycleStat>> {
        self.memory.stats().await
    }

    async fn recent(&self, page: Page) -> EngineResult<Paged<HistoryEntry>> {
        self.memory.recent(page).await
    }
}
