//! States command implementation.

use anyhow::{Context, Result};

use super::config_only_engine;
use crate::config::Config;

/// Print built-in states followed by custom ones.
pub fn execute(config: &Config) -> Result<()> {
    let engine = config_only_engine(config);
    let snapshot = engine
        .refresh()
        .context("Failed to load lifecycle configuration")?;
    let custom = snapshot.states.custom_keys();

    for state in snapshot.states.all_states() {
        let origin = if custom.contains(&state.key.as_str()) {
            "custom"
        } else {
            "built-in"
        };
        println!(
            "{}  {:<12} {:<9} {}",
            state.key, state.label, origin, state.description
        );
    }
    Ok(())
}
