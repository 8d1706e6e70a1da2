//! Lifecycle CLI - run, inspect and validate the identity lifecycle engine.
//!
//! Configuration comes from `LIFECYCLE_*` environment variables (or `.env`), the user config
//! file and the flags below.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use config::Config;

/// Lifecycle CLI - rule-driven identity lifecycle engine.
#[derive(Parser, Debug)]
#[command(
    name = "lifecycle",
    author,
    version,
    about = "Rule-driven identity lifecycle engine",
    long_about = None
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Live configuration directory (overrides LIFECYCLE_CONFIG_DIR).
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Packaged defaults directory (overrides LIFECYCLE_DEFAULTS_DIR).
    #[arg(long, global = true)]
    defaults_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine: event dispatch, scheduled sweeps and the HTTP API.
    Serve {
        /// Port to listen on (overrides LIFECYCLE_PORT).
        #[arg(short, long)]
        port: Option<u16>,

        /// JSON array of entity documents to load into the store at startup.
        #[arg(long)]
        seed: Option<PathBuf>,
    },

    /// Print the source index: candidate rules per state, in evaluation order.
    List,

    /// Run one trigger sweep now.
    Execute {
        /// Only sweep rules listing this source state (key or built-in name).
        source: Option<String>,

        /// JSON array of entity documents to sweep.
        #[arg(long)]
        seed: Option<PathBuf>,

        /// Write the swept documents back to the seed file.
        #[arg(long, requires = "seed")]
        write_back: bool,
    },

    /// Validate the state catalog and every rule document.
    Check,

    /// Copy packaged default configuration into the live directory.
    Init,

    /// Print built-in and custom states.
    States,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup tracing based on verbosity; RUST_LOG wins when set
    let level = if cli.quiet {
        Level::ERROR
    } else if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load()?;
    if let Some(dir) = cli.config_dir {
        config.config_dir = dir;
    }
    if let Some(dir) = cli.defaults_dir {
        config.defaults_dir = dir;
    }

    match cli.command {
        Commands::Serve { port, seed } => {
            if let Some(port) = port {
                config.port = port;
            }
            commands::serve::execute(&config, seed.as_deref()).await?;
        }
        Commands::List => commands::list::execute(&config)?,
        Commands::Execute {
            source,
            seed,
            write_back,
        } => {
            commands::execute::execute(&config, source.as_deref(), seed.as_deref(), write_back)
                .await?;
        }
        Commands::Check => commands::check::execute(&config)?,
        Commands::Init => commands::init::execute(&config)?,
        Commands::States => commands::states::execute(&config)?,
    }

    Ok(())
}
