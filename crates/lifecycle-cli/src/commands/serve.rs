//! Serve command implementation.
//!
//! Runs the whole engine in one process:
//!
//! - an in-memory entity store whose writes feed the cascading dispatcher,
//! - the cron-driven trigger sweep,
//! - the HTTP API (`/lifecycle/*` reads, `/identities/*` writes, `/health`).
//!
//! History is appended to the configured JSON-lines file.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use lifecycle_api::{create_api_router, create_api_state, create_identity_router};
use lifecycle_engine::{
    bootstrap_defaults, spawn_event_loop, CronSchedule, LifecycleEngine, MemoryEntityStore,
    SweepScheduler, SystemClock,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{open_history, seed_store};
use crate::config::Config;

/// Start the engine and serve until ctrl-c.
pub async fn execute(config: &Config, seed: Option<&Path>) -> Result<()> {
    bootstrap_defaults(&config.config_dir, &config.defaults_dir)
        .context("Failed to bootstrap lifecycle configuration")?;
    let schedule = CronSchedule::parse(&config.trigger_cron)
        .with_context(|| format!("Invalid trigger cron expression: {}", config.trigger_cron))?;

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let store = Arc::new(MemoryEntityStore::new().with_events(events_tx));
    if let Some(seed) = seed {
        seed_store(&store, seed).await?;
    }

    let engine = Arc::new(LifecycleEngine::new(
        config.engine_config(),
        store.clone(),
        open_history(config)?,
    ));
    let snapshot = engine
        .refresh()
        .context("Failed to load lifecycle configuration")?;
    info!(
        sources = snapshot.index.len(),
        rules = snapshot.rules.rule_count(),
        custom_states = snapshot.states.custom_states().len(),
        "Lifecycle configuration loaded"
    );

    let event_loop = spawn_event_loop(engine.clone(), events_rx);
    let scheduler = SweepScheduler::spawn(engine.clone(), schedule, Arc::new(SystemClock));

    let app = create_api_router(create_api_state(engine.clone())).merge(create_identity_router(store));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Print server info
    println!();
    println!("🚀 Lifecycle Server");
    println!("   API:    http://localhost:{}/lifecycle/states", config.port);
    println!("   Health: http://localhost:{}/health", config.port);
    println!("   Config: {}", config.config_dir.display());
    println!("   Sweep:  {}", config.trigger_cron);
    println!();
    println!("   Press Ctrl+C to stop");
    println!();

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let shutdown = scheduler.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    scheduler.shutdown().await;
    event_loop.abort();
    info!("Lifecycle server stopped");
    Ok(())
}

/// Resolve on ctrl-c, cancelling the sweep scheduler.
async fn shutdown_signal(scheduler: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    scheduler.cancel();
}
