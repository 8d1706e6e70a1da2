use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lifecycle_core::validation::validate_state_document;
use lifecycle_core::StateCatalog;
use tracing::{debug, info, warn};

use super::{modified_ms, parse_yaml, MISSING_SIGNATURE};
use crate::cache::ConfigCache;
use crate::error::{ConfigLoadError, EngineError, EngineResult};

/// Loads the custom state catalog from a single YAML document.
#[derive(Debug)]
pub struct StateLoader {
    path: PathBuf,
    cache: Arc<ConfigCache<StateCatalog>>,
    parses: AtomicU64,
}

impl StateLoader {
    pub fn new(path: impl Into<PathBuf>, cache: Arc<ConfigCache<StateCatalog>>) -> Self {
        Self {
            path: path.into(),
            cache,
            parses: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of full parses performed so far (cache hits excluded).
    pub fn parse_count(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Load the catalog. Signature is the file's modification time.
    ///
    /// A missing file yields an empty catalog with modification time `0`.
    pub fn load(&self) -> EngineResult<Arc<StateCatalog>> {
        if !self.path.exists() {
            if let Some(cached) = self.cache.get(MISSING_SIGNATURE) {
                return Ok(cached);
            }
            warn!(path = %self.path.display(), "State catalog not found, using built-in states only");
            let empty = Arc::new(StateCatalog::empty());
            self.cache.put(MISSING_SIGNATURE, Arc::clone(&empty));
            return Ok(empty);
        }

        let result = self.load_file();
        if result.is_err() {
            self.cache.invalidate();
        }
        result
    }

    fn load_file(&self) -> EngineResult<Arc<StateCatalog>> {
        let mtime = modified_ms(&self.path)?;
        let signature = mtime.to_string();
        if let Some(cached) = self.cache.get(&signature) {
            debug!(path = %self.path.display(), "Returning cached lifecycle states (catalog unchanged)");
            return Ok(cached);
        }

        let text = std::fs::read_to_string(&self.path).map_err(|e| EngineError::io(&self.path, e))?;
        let states = parse_yaml(&text)
            .and_then(|doc| validate_state_document(&doc))
            .map_err(|violations| ConfigLoadError::single(self.file_name(), violations))?;

        let catalog = Arc::new(StateCatalog::new(states, mtime));
        self.parses.fetch_add(1, Ordering::Relaxed);
        info!(
            path = %self.path.display(),
            custom = catalog.custom_states().len(),
            "Loaded custom lifecycle states"
        );
        self.cache.put(signature, Arc::clone(&catalog));
        Ok(catalog)
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
