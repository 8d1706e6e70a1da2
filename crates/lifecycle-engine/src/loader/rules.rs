use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lifecycle_core::validation::validate_rule_document;
use lifecycle_core::{RuleFile, RuleSet, StateCatalog};
use tracing::{debug, info, warn};

use super::{is_yaml, modified_ms, parse_yaml, MISSING_SIGNATURE};
use crate::cache::ConfigCache;
use crate::error::{ConfigLoadError, EngineError, EngineResult, FileViolations};

struct RuleSource {
    name: String,
    path: PathBuf,
    modified_ms: u64,
}

/// Loads every YAML rule document in a directory into one [`RuleSet`].
#[derive(Debug)]
pub struct RuleLoader {
    dir: PathBuf,
    cache: Arc<ConfigCache<RuleSet>>,
    parses: AtomicU64,
}

impl RuleLoader {
    pub fn new(dir: impl Into<PathBuf>, cache: Arc<ConfigCache<RuleSet>>) -> Self {
        Self {
            dir: dir.into(),
            cache,
            parses: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of full parses performed so far (cache hits excluded).
    pub fn parse_count(&self) -> u64 {
        self.parses.load(Ordering::Relaxed)
    }

    /// Forget the cached rule set; the next load reparses.
    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Load the rule set, validating state references against `states`.
    ///
    /// Files are read in name order. If any file fails to parse or validate, nothing is
    /// returned, the cache is cleared, and the error lists the violations of every bad file.
    pub fn load(&self, states: &StateCatalog) -> EngineResult<Arc<RuleSet>> {
        if !self.dir.is_dir() {
            if let Some(cached) = self.cache.get(MISSING_SIGNATURE) {
                return Ok(cached);
            }
            warn!(dir = %self.dir.display(), "Rules directory not found, no lifecycle rules loaded");
            let empty = Arc::new(RuleSet::empty());
            self.cache.put(MISSING_SIGNATURE, Arc::clone(&empty));
            return Ok(empty);
        }

        let sources = match self.scan() {
            Ok(sources) => sources,
            Err(e) => {
                self.cache.invalidate();
                return Err(e);
            }
        };
        let signature = sources
            .iter()
            .map(|s| format!("{}:{}", s.name, s.modified_ms))
            .collect::<Vec<_>>()
            .join("|");

        if let Some(cached) = self.cache.get(&signature) {
            debug!(dir = %self.dir.display(), "Returning cached lifecycle rules (files unchanged)");
            return Ok(cached);
        }

        match self.parse_all(&sources, states) {
            Ok(set) => {
                let set = Arc::new(set);
                self.parses.fetch_add(1, Ordering::Relaxed);
                info!(
                    dir = %self.dir.display(),
                    files = set.files().len(),
                    rules = set.rule_count(),
                    "Loaded lifecycle rules"
                );
                self.cache.put(signature, Arc::clone(&set));
                Ok(set)
            }
            Err(e) => {
                self.cache.invalidate();
                Err(e)
            }
        }
    }

    fn scan(&self) -> EngineResult<Vec<RuleSource>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| EngineError::io(&self.dir, e))?;

        let mut sources = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| EngineError::io(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_yaml(&path) {
                warn!(file = %name, "Skipping non-YAML file in rules directory");
                continue;
            }
            sources.push(RuleSource {
                modified_ms: modified_ms(&path)?,
                name,
                path,
            });
        }
        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }

    fn parse_all(&self, sources: &[RuleSource], states: &StateCatalog) -> EngineResult<RuleSet> {
        let mut files = Vec::with_capacity(sources.len());
        let mut failures = Vec::new();

        for source in sources {
            let text =
                std::fs::read_to_string(&source.path).map_err(|e| EngineError::io(&source.path, e))?;
            let parsed = parse_yaml(&text).and_then(|doc| validate_rule_document(&doc, states));
            match parsed {
                Ok(rules) => {
                    debug!(file = %source.name, rules = rules.len(), "Parsed rule document");
                    files.push(RuleFile {
                        name: source.name.clone(),
                        rules,
                    });
                }
                Err(violations) => failures.push(FileViolations {
                    file: source.name.clone(),
                    violations,
                }),
            }
        }

        if !failures.is_empty() {
            return Err(ConfigLoadError { files: failures }.into());
        }
        Ok(RuleSet::new(files))
    }
}
