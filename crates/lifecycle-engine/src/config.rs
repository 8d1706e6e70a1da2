//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name of the state catalog inside the configuration directory.
pub const STATES_FILE: &str = "states.yml";

/// Name of the rules directory inside the configuration directory.
pub const RULES_DIR: &str = "rules";

/// Where configuration lives and how often the engine looks at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Live configuration directory (holds `states.yml` and `rules/`).
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Packaged defaults copied into `config_dir` on first run.
    #[serde(default = "default_defaults_dir")]
    pub defaults_dir: PathBuf,

    /// Cron expression driving the time-trigger sweep (5 or 6 fields).
    #[serde(default = "default_cron_expression")]
    pub cron_expression: String,

    /// Maximum age of the configuration snapshot served to readers, in seconds.
    #[serde(default = "default_freshness_ttl_secs")]
    pub freshness_ttl_secs: u64,

    /// Append-only history file. In-memory history when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_file: Option<PathBuf>,
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("configs/lifecycle")
}

fn default_defaults_dir() -> PathBuf {
    PathBuf::from("defaults/lifecycle")
}

fn default_cron_expression() -> String {
    "*/5 * * * *".to_string()
}

fn default_freshness_ttl_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            defaults_dir: default_defaults_dir(),
            cron_expression: default_cron_expression(),
            freshness_ttl_secs: default_freshness_ttl_secs(),
            history_file: None,
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at `config_dir`, everything else default.
    pub fn with_config_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            ..Self::default()
        }
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.config_dir.join(RULES_DIR)
    }

    pub fn states_file(&self) -> PathBuf {
        self.config_dir.join(STATES_FILE)
    }

    pub fn freshness_ttl(&self) -> Duration {
        Duration::from_secs(self.freshness_ttl_secs)
    }
}
