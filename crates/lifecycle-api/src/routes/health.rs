//! Health check endpoint.

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::types::{ApiResponse, ApiState, HealthResponse};

/// Handler for GET /health
pub async fn health_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<HealthResponse>> {
    let snapshot = state.engine.snapshot();
    let response = HealthResponse {
        status: "ok".to_string(),
        sources: snapshot.index.len(),
        rules: snapshot.rules.rule_count(),
        custom_states: snapshot.states.custom_states().len(),
    };
    Json(ApiResponse::new(response))
}
