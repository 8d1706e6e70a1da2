//! Check command implementation.
//!
//! Loads both configuration sources once and reports every violation.

use anyhow::{Context, Result};

use super::config_only_engine;
use crate::config::Config;

/// Validate the state catalog and all rule documents; fails on the first invalid source.
pub fn execute(config: &Config) -> Result<()> {
    let engine = config_only_engine(config);
    let snapshot = engine.refresh().with_context(|| {
        format!(
            "Lifecycle configuration in {} is invalid",
            config.config_dir.display()
        )
    })?;

    println!("✅ Lifecycle configuration is valid");
    println!(
        "   States: {} custom ({} total)",
        snapshot.states.custom_states().len(),
        snapshot.states.all_keys().len()
    );
    println!(
        "   Rules:  {} in {} file(s), {} source state(s)",
        snapshot.rules.rule_count(),
        snapshot.rules.files().len(),
        snapshot.index.len()
    );
    Ok(())
}
