//! First-run copy of packaged default configuration.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::config::RULES_DIR;
use crate::error::{EngineError, EngineResult};
use crate::loader::is_yaml;

/// Copy packaged defaults from `defaults_dir` into `config_dir`.
///
/// - every top-level default file missing from `config_dir` is copied;
/// - the default rule documents are copied only when `config_dir/rules` holds no YAML
///   document at all, so a deployment that deleted a default rule does not get it back.
///
/// A file that fails to copy is logged and skipped. Returns the paths written.
pub fn bootstrap_defaults(config_dir: &Path, defaults_dir: &Path) -> EngineResult<Vec<PathBuf>> {
    let rules_dir = config_dir.join(RULES_DIR);
    std::fs::create_dir_all(&rules_dir).map_err(|e| EngineError::io(&rules_dir, e))?;

    if !defaults_dir.is_dir() {
        warn!(dir = %defaults_dir.display(), "Default lifecycle configuration not found, nothing to copy");
        return Ok(Vec::new());
    }

    let mut copied = copy_missing(defaults_dir, config_dir)?;

    let default_rules = defaults_dir.join(RULES_DIR);
    if default_rules.is_dir() && !has_yaml(&rules_dir)? {
        copied.extend(copy_missing(&default_rules, &rules_dir)?);
    }

    if !copied.is_empty() {
        info!(count = copied.len(), dir = %config_dir.display(), "Copied default lifecycle configuration");
    }
    Ok(copied)
}

fn copy_missing(from: &Path, to: &Path) -> EngineResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(from).map_err(|e| EngineError::io(from, e))?;
    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(from, e))?;
        let source = entry.path();
        if !source.is_file() {
            continue;
        }
        let dest = to.join(entry.file_name());
        if dest.exists() {
            continue;
        }
        match std::fs::copy(&source, &dest) {
            Ok(_) => {
                warn!(file = %dest.display(), "Copied default lifecycle file");
                copied.push(dest);
            }
            Err(e) => error!(file = %source.display(), error = %e, "Error copying default lifecycle file"),
        }
    }
    copied.sort();
    Ok(copied)
}

fn has_yaml(dir: &Path) -> EngineResult<bool> {
    let entries = std::fs::read_dir(dir).map_err(|e| EngineError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::io(dir, e))?;
        if is_yaml(&entry.path()) {
            return Ok(true);
        }
    }
    Ok(false)
}
