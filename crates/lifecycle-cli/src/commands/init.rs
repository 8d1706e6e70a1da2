//! Init command implementation.

use anyhow::{Context, Result};
use lifecycle_engine::bootstrap_defaults;

use crate::config::Config;

/// Copy packaged defaults into the live configuration directory.
pub fn execute(config: &Config) -> Result<()> {
    let copied = bootstrap_defaults(&config.config_dir, &config.defaults_dir)
        .context("Failed to bootstrap lifecycle configuration")?;

    if copied.is_empty() {
        println!(
            "Nothing to copy: {} is already initialized",
            config.config_dir.display()
        );
        return Ok(());
    }

    println!("📁 Initialized {}", config.config_dir.display());
    for path in &copied {
        println!("   + {}", path.display());
    }
    Ok(())
}
