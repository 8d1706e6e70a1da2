//! List command implementation.

use anyhow::{Context, Result};

use super::config_only_engine;
use crate::config::Config;

/// Print the source index in evaluation order.
pub fn execute(config: &Config) -> Result<()> {
    let engine = config_only_engine(config);
    let snapshot = engine
        .refresh()
        .context("Failed to load lifecycle configuration")?;

    if snapshot.index.is_empty() {
        println!(
            "No lifecycle rules in {}",
            config.engine_config().rules_dir().display()
        );
        return Ok(());
    }

    for (source, rules) in snapshot.index.iter() {
        println!("{source}:");
        for (position, indexed) in rules.iter().enumerate() {
            let trigger = indexed
                .rule
                .trigger
                .map(|t| format!("after {t}"))
                .unwrap_or_else(|| "on change".to_string());
            println!(
                "  {position}. -> {:<3} {:<12} {}",
                indexed.rule.target, trigger, indexed.origin
            );
        }
    }
    Ok(())
}
