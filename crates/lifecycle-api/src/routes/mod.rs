//! API route handlers.

mod config;
mod health;
mod history;
mod identities;
mod states;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use lifecycle_engine::MemoryEntityStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::middleware::ensure_fresh;
use crate::types::ApiState;

/// The `/lifecycle` routes, behind the freshness gate. Not yet bound to a state.
pub fn create_lifecycle_router(state: Arc<ApiState>) -> Router<Arc<ApiState>> {
    Router::new()
        .route("/identity/{id}", get(history::identity_handler))
        .route("/stats", get(history::stats_handler))
        .route("/recent", get(history::recent_handler))
        .route("/states", get(states::states_handler))
        .route("/states/custom", get(states::custom_states_handler))
        .route("/sources", get(config::sources_handler))
        .route("/reload", post(config::reload_handler))
        .route_layer(middleware::from_fn_with_state(state, ensure_fresh))
}

/// Write access to an in-process entity store under `/identities`.
///
/// Only meaningful when the engine's entity store is that same [`MemoryEntityStore`] with an
/// event channel attached; merge it into the router from [`create_api_router`].
pub fn create_identity_router(store: Arc<MemoryEntityStore>) -> Router {
    Router::new()
        .route(
            "/identities/{id}",
            get(identities::get_handler)
                .put(identities::put_handler)
                .patch(identities::patch_handler),
        )
        .with_state(store)
}

/// Create the API router with all read endpoints.
pub fn create_api_router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_handler))
        .nest("/lifecycle", create_lifecycle_router(Arc::clone(&state)))
        // Request tracing (enable with RUST_LOG=tower_http=info or higher)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(
                    DefaultMakeSpan::new()
                        .level(Level::INFO)
                        .include_headers(false),
                )
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}
