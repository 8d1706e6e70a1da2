//! Request middleware.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::types::ApiState;

/// Refresh the engine's configuration caches when older than the freshness TTL.
pub async fn ensure_fresh(
    State(state): State<Arc<ApiState>>,
    request: Request,
    next: Next,
) -> Response {
    state.engine.ensure_fresh();
    next.run(request).await
}
