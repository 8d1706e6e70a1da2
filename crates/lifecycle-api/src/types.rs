//! API types and DTOs.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use lifecycle_core::Paged;
use lifecycle_engine::LifecycleEngine;
use serde::{Deserialize, Serialize};

/// Shared application state for the API.
pub struct ApiState {
    /// The engine every handler reads from.
    pub engine: Arc<LifecycleEngine>,
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// HTTP status, repeated in the body.
    pub status_code: u16,
    /// Response data.
    pub data: T,
    /// Unpaginated result count, for paginated endpoints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

impl<T> ApiResponse<T> {
    /// A `200` response with the current timestamp.
    pub fn new(data: T) -> Self {
        Self {
            status_code: 200,
            data,
            total: None,
            timestamp: now_ms(),
        }
    }
}

impl<T> ApiResponse<Vec<T>> {
    /// A `200` response for one page, carrying the total.
    pub fn paged(page: Paged<T>) -> Self {
        Self {
            total: Some(page.total),
            ..Self::new(page.data)
        }
    }
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub status_code: u16,
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable message; for configuration errors, one violation per line.
    pub message: String,
    pub timestamp: u64,
}

impl ApiErrorResponse {
    pub fn new(status_code: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            code: code.into(),
            message: message.into(),
            timestamp: now_ms(),
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Number of source states with at least one rule.
    pub sources: usize,
    /// Number of loaded rules.
    pub rules: usize,
    /// Number of custom states.
    pub custom_states: usize,
}

/// Result of a forced configuration reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub sources: usize,
    pub rules: usize,
    pub custom_states: usize,
    /// Modification time of the state catalog, ms since epoch (`0` when absent).
    pub states_modified_ms: u64,
}

/// One candidate rule of the source index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceEntry {
    pub source: String,
    /// Evaluation position within the source's candidate list.
    pub position: usize,
    pub target: String,
    /// Trigger in compact form (`90d`), absent for event-driven rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    /// `file#index` of the rule's definition.
    pub origin: String,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
