//! History read endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use lifecycle_core::{HistoryEntry, LifecycleStat, Page};
use tracing::debug;

use crate::types::{ApiResponse, ApiState};

/// Handler for GET /lifecycle/identity/{id} - history of one entity, newest first.
pub async fn identity_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Query(page): Query<Page>,
) -> Json<ApiResponse<Vec<HistoryEntry>>> {
    let history = state.engine.history_for(&id, page).await;
    debug!(ref_id = %id, total = history.total, "Lifecycle history served");
    Json(ApiResponse::paged(history))
}

/// Handler for GET /lifecycle/stats
pub async fn stats_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<Vec<LifecycleStat>>> {
    Json(ApiResponse::new(state.engine.stats().await))
}

/// Handler for GET /lifecycle/recent - recent transitions across all entities.
pub async fn recent_handler(
    State(state): State<Arc<ApiState>>,
    Query(page): Query<Page>,
) -> Json<ApiResponse<Vec<HistoryEntry>>> {
    Json(ApiResponse::paged(state.engine.recent(page).await))
}
