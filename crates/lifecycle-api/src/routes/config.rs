//! Configuration inspection endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lifecycle_engine::EngineError;
use tracing::{error, info, warn};

use crate::types::{ApiErrorResponse, ApiResponse, ApiState, ReloadResponse, SourceEntry};

/// Handler for GET /lifecycle/sources - every candidate rule in evaluation order.
pub async fn sources_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<Vec<SourceEntry>>> {
    let index = state.engine.source_index();
    let entries = index
        .iter()
        .flat_map(|(source, rules)| {
            rules.iter().enumerate().map(move |(position, indexed)| SourceEntry {
                source: source.to_string(),
                position,
                target: indexed.rule.target.clone(),
                trigger: indexed.rule.trigger.map(|t| t.to_string()),
                origin: indexed.origin.to_string(),
            })
        })
        .collect();
    Json(ApiResponse::new(entries))
}

/// Handler for POST /lifecycle/reload - re-check both configuration sources now.
///
/// Invalid configuration answers `422` with every violation; the previous configuration stays
/// in effect.
pub async fn reload_handler(State(state): State<Arc<ApiState>>) -> Response {
    match state.engine.refresh() {
        Ok(snapshot) => {
            let response = ReloadResponse {
                sources: snapshot.index.len(),
                rules: snapshot.rules.rule_count(),
                custom_states: snapshot.states.custom_states().len(),
                states_modified_ms: snapshot.states.modified_ms(),
            };
            info!(
                sources = response.sources,
                rules = response.rules,
                "Lifecycle configuration reloaded"
            );
            (StatusCode::OK, Json(ApiResponse::new(response))).into_response()
        }
        Err(EngineError::Config(e)) => {
            warn!(files = e.files.len(), "Lifecycle configuration rejected");
            let status = StatusCode::UNPROCESSABLE_ENTITY;
            (
                status,
                Json(ApiErrorResponse::new(
                    status.as_u16(),
                    "CONFIG_INVALID",
                    e.to_string(),
                )),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Lifecycle configuration reload failed");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (
                status,
                Json(ApiErrorResponse::new(
                    status.as_u16(),
                    "CONFIG_ERROR",
                    e.to_string(),
                )),
            )
                .into_response()
        }
    }
}
