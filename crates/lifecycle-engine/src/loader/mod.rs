//! Loaders for the rule directory and the state catalog.
//!
//! Both loaders follow the same discipline:
//!
//! 1. compute a signature from file names and modification times,
//! 2. return the cached value if the signature is unchanged,
//! 3. otherwise read, parse and validate everything; on any failure clear the cache and
//!    report every violation at once.
//!
//! File reads are blocking `std::fs` calls. Configuration is small and loads happen at
//! bootstrap, on sweep ticks and behind the freshness gate, so this is accepted.

mod rules;
mod states;

pub use rules::RuleLoader;
pub use states::StateLoader;

use std::path::Path;
use std::time::UNIX_EPOCH;

use lifecycle_core::{FieldPath, Violation};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};

/// Signature used when the configuration source does not exist.
pub(crate) const MISSING_SIGNATURE: &str = "<missing>";

/// Modification time of `path` in milliseconds since the epoch.
pub(crate) fn modified_ms(path: &Path) -> EngineResult<u64> {
    let modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| EngineError::io(path, e))?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0))
}

/// Whether `path` names a YAML document.
pub(crate) fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

/// Parse YAML text into a JSON value tree. Syntax errors become a document-level violation.
pub(crate) fn parse_yaml(text: &str) -> Result<Value, Vec<Violation>> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str::<Value>(text)
        .map_err(|e| vec![Violation::new(&FieldPath::root(), "yamlSyntax", e.to_string())])
}
