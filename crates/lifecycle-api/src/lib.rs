//! HTTP read API for the lifecycle engine.
//!
//! ## Endpoints
//!
//! - `GET /health` - Service status with index and catalog sizes
//! - `GET /lifecycle/identity/{id}?skip=&limit=` - Transition history of one entity, newest first
//! - `GET /lifecycle/stats` - Transition counts per reached state
//! - `GET /lifecycle/recent?skip=&limit=` - Recent transitions across all entities
//! - `GET /lifecycle/states` - Built-in and custom states (conditional: `ETag` / `If-None-Match`)
//! - `GET /lifecycle/states/custom` - Custom states only
//! - `GET /lifecycle/sources` - The source index: candidate rules per state
//! - `POST /lifecycle/reload` - Re-check configuration now, reporting validation errors
//!
//! [`create_identity_router`] adds `GET`/`PUT`/`PATCH /identities/{id}` over an in-process
//! entity store; those writes go through the store's change events and so reach the dispatcher.
//!
//! Every `/lifecycle` route runs behind the engine's freshness gate, so configuration edits are
//! picked up at most one TTL after they land on disk.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lifecycle_api::{create_api_router, create_api_state};
//! use lifecycle_engine::{EngineConfig, LifecycleEngine, MemoryEntityStore, MemoryHistoryStore};
//!
//! let engine = LifecycleEngine::new(
//!     EngineConfig::default(),
//!     Arc::new(MemoryEntityStore::new()),
//!     Arc::new(MemoryHistoryStore::new()),
//! );
//! let router = create_api_router(create_api_state(Arc::new(engine)));
//! ```

mod middleware;
mod routes;
mod types;

pub use routes::{create_api_router, create_identity_router, create_lifecycle_router};
pub use types::{
    ApiErrorResponse, ApiResponse, ApiState, HealthResponse, ReloadResponse, SourceEntry,
};

use std::sync::Arc;

use lifecycle_engine::LifecycleEngine;

/// Create the shared API state around an engine.
pub fn create_api_state(engine: Arc<LifecycleEngine>) -> Arc<ApiState> {
    Arc::new(ApiState { engine })
}
