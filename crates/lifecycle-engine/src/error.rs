//! Error types for the lifecycle engine.

use std::fmt;
use std::path::PathBuf;

use lifecycle_core::{format_violations, Violation};
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while loading configuration or driving transitions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A rule or state document failed to parse or validate. The whole load is rejected.
    #[error(transparent)]
    Config(#[from] ConfigLoadError),

    /// I/O error on a configuration or history file.
    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The entity store rejected an operation.
    #[error("entity store error: {0}")]
    Store(String),

    /// The history store rejected an operation.
    #[error("history store error: {0}")]
    History(String),

    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {message}")]
    Schedule { expression: String, message: String },

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Violations found in one configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileViolations {
    pub file: String,
    pub violations: Vec<Violation>,
}

/// Aggregated validation failure across every rejected file of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLoadError {
    pub files: Vec<FileViolations>,
}

impl ConfigLoadError {
    pub fn single(file: impl Into<String>, violations: Vec<Violation>) -> Self {
        Self {
            files: vec![FileViolations {
                file: file.into(),
                violations,
            }],
        }
    }

    /// Every violation, regardless of file.
    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.files.iter().flat_map(|f| f.violations.iter())
    }
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<String> = self
            .files
            .iter()
            .map(|file| {
                format!(
                    "Validation errors in file '{}':\n{}",
                    file.file,
                    format_violations(&file.violations)
                )
            })
            .collect();
        f.write_str(&blocks.join("\n"))
    }
}

impl std::error::Error for ConfigLoadError {}

#[cfg(test)]
mod tests {
    use super::*;
    use lifecycle_core::FieldPath;

    #[test]
    fn test_config_error_display_nests_file_then_property() {
        let err = ConfigLoadError {
            files: vec![
                FileViolations {
                    file: "a.yml".into(),
                    violations: vec![Violation::new(
                        &FieldPath::root().field("identities").index(0).field("target"),
                        "isKnownState",
                        "unknown lifecycle state 'Q'",
                    )],
                },
                FileViolations {
                    file: "b.yml".into(),
                    violations: vec![Violation::new(&FieldPath::root(), "yamlSyntax", "bad")],
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "Validation errors in file 'a.yml':\n\
             • Property 'identities[0].target': unknown lifecycle state 'Q' (constraint: isKnownState)\n\
             Validation errors in file 'b.yml':\n\
             • bad (constraint: yamlSyntax)"
        );
        assert_eq!(err.violations().count(), 2);
    }
}
