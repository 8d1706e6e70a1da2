//! State catalog endpoints.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use lifecycle_core::LifecycleState;
use tracing::debug;

use crate::types::{ApiResponse, ApiState};

const STATES_CACHE_CONTROL: &str = "public, max-age=1, must-revalidate";

/// Handler for GET /lifecycle/states - built-in then custom states.
///
/// The entity tag is the catalog file's modification time, so a client holding the current tag
/// gets `304 Not Modified` with an empty body. The catalog signature is re-checked on every
/// request (a stat call, no reparse unless the file changed), so the tag follows edits at once.
pub async fn states_handler(State(state): State<Arc<ApiState>>, headers: HeaderMap) -> Response {
    let snapshot = state.engine.view();
    let modified_ms = snapshot.states.modified_ms();
    let etag = format!("\"{modified_ms}\"");
    debug!(modified_ms, "Lifecycle states file age");

    let mut cache_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&etag) {
        cache_headers.insert(header::ETAG, value);
    }
    if let Ok(value) = HeaderValue::from_str(&http_date(modified_ms)) {
        cache_headers.insert(header::LAST_MODIFIED, value);
    }
    cache_headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(STATES_CACHE_CONTROL),
    );

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == etag);
    if not_modified {
        return (StatusCode::NOT_MODIFIED, cache_headers).into_response();
    }

    (
        StatusCode::OK,
        cache_headers,
        Json(ApiResponse::new(snapshot.states.all_states())),
    )
        .into_response()
}

/// Handler for GET /lifecycle/states/custom
pub async fn custom_states_handler(
    State(state): State<Arc<ApiState>>,
) -> Json<ApiResponse<Vec<LifecycleState>>> {
    Json(ApiResponse::new(state.engine.list_custom_states()))
}

/// RFC 7231 date, e.g. `Wed, 01 May 2024 10:00:00 GMT`.
fn http_date(ms: u64) -> String {
    let at = i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
