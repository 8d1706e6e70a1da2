//! CLI configuration management.
//!
//! Precedence, lowest first: built-in defaults, the user config file
//! (`config.json` in the platform config directory), `.env` / environment variables,
//! command-line flags.

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use lifecycle_engine::EngineConfig;
use serde::{Deserialize, Serialize};

/// Application-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Live lifecycle configuration directory (`states.yml`, `rules/`).
    pub config_dir: PathBuf,

    /// Packaged defaults copied on first run.
    pub defaults_dir: PathBuf,

    /// Cron expression for the time-trigger sweep.
    pub trigger_cron: String,

    /// Freshness TTL of the configuration caches, in seconds.
    pub cache_ttl_secs: u64,

    /// Append-only history file.
    pub history_file: PathBuf,

    /// HTTP port for `serve`.
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineConfig::default();
        let history_file = ProjectDirs::from("dev", "lifecycle", "lifecycle")
            .map(|dirs| dirs.data_dir().join("history.jsonl"))
            .unwrap_or_else(|| std::env::temp_dir().join("lifecycle").join("history.jsonl"));

        Self {
            config_dir: engine.config_dir,
            defaults_dir: engine.defaults_dir,
            trigger_cron: engine.cron_expression,
            cache_ttl_secs: engine.freshness_ttl_secs,
            history_file,
            port: 3000,
        }
    }
}

impl Config {
    /// Load configuration from the config file, `.env` and environment variables.
    pub fn load() -> Result<Self> {
        // Load .env file if present (silently ignore if missing)
        let _ = dotenvy::dotenv();

        let mut config = match Self::config_file_path() {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config from {}", path.display()))?;
                serde_json::from_str(&contents)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            _ => Self::default(),
        };

        if let Ok(dir) = std::env::var("LIFECYCLE_CONFIG_DIR") {
            config.config_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("LIFECYCLE_DEFAULTS_DIR") {
            config.defaults_dir = PathBuf::from(dir);
        }
        if let Ok(cron) = std::env::var("LIFECYCLE_TRIGGER_CRON") {
            config.trigger_cron = cron;
        }
        if let Ok(ttl) = std::env::var("LIFECYCLE_CACHE_TTL_SECS") {
            config.cache_ttl_secs = ttl
                .parse()
                .with_context(|| format!("LIFECYCLE_CACHE_TTL_SECS is not a number: {ttl}"))?;
        }
        if let Ok(file) = std::env::var("LIFECYCLE_HISTORY_FILE") {
            config.history_file = PathBuf::from(file);
        }
        if let Ok(port) = std::env::var("LIFECYCLE_PORT") {
            config.port = port
                .parse()
                .with_context(|| format!("LIFECYCLE_PORT is not a port number: {port}"))?;
        }

        Ok(config)
    }

    /// Get the path to the config file.
    pub fn config_file_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "lifecycle", "lifecycle")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// The engine's view of this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            config_dir: self.config_dir.clone(),
            defaults_dir: self.defaults_dir.clone(),
            cron_expression: self.trigger_cron.clone(),
            freshness_ttl_secs: self.cache_ttl_secs,
            history_file: Some(self.history_file.clone()),
        }
    }
}
