//! Execute command implementation.
//!
//! Runs one trigger sweep immediately, outside the cron schedule.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use lifecycle_engine::{LifecycleEngine, MemoryEntityStore};

use super::{open_history, seed_store, write_seed};
use crate::config::Config;

/// Sweep every time-triggered rule, or only those listing `source`.
pub async fn execute(
    config: &Config,
    source: Option<&str>,
    seed: Option<&Path>,
    write_back: bool,
) -> Result<()> {
    let store = Arc::new(MemoryEntityStore::new());
    if let Some(seed) = seed {
        seed_store(&store, seed).await?;
    }

    let engine = LifecycleEngine::new(config.engine_config(), store.clone(), open_history(config)?);
    let snapshot = engine
        .refresh()
        .context("Failed to load lifecycle configuration")?;

    let now = Utc::now();
    let report = match source {
        Some(reference) => {
            let Some(key) = snapshot.states.resolve(reference) else {
                bail!("Unknown lifecycle state: {reference}");
            };
            println!("⏱  Sweeping rules for source {key}");
            engine.sweep_source(now, &key).await
        }
        None => {
            println!("⏱  Sweeping all time-triggered rules");
            engine.run_sweep(now).await
        }
    };

    for transition in &report.transitions {
        println!(
            "   {} {} -> {} ({})",
            transition.entity_id, transition.from, transition.to, transition.origin
        );
    }
    for failure in &report.failures {
        eprintln!(
            "   ⚠️  {} [{}]: {}",
            failure.origin,
            failure.entity_id.as_deref().unwrap_or("*"),
            failure.message
        );
    }
    println!(
        "✅ {} transition(s), {} failure(s)",
        report.transitions.len(),
        report.failures.len()
    );

    if write_back {
        if let Some(seed) = seed {
            write_seed(&store, seed).await?;
            println!("💾 Saved to {}", seed.display());
        }
    }
    Ok(())
}
