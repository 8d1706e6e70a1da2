//! Entity write endpoints over the in-process store.
//!
//! Writes made here publish change events, so they reach the dispatcher exactly like an
//! external writer's updates would.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lifecycle_core::{Entity, Update, ID_FIELD};
use lifecycle_engine::{EntityStore, MemoryEntityStore};
use serde_json::{Map, Value};
use tracing::{error, info};

use crate::types::{ApiErrorResponse, ApiResponse};

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiErrorResponse::new(status.as_u16(), code, message)),
    )
        .into_response()
}

fn not_found(id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        format!("identity '{id}' not found"),
    )
}

/// GET /identities/{id}
pub async fn get_handler(
    State(store): State<Arc<MemoryEntityStore>>,
    Path(id): Path<String>,
) -> Response {
    match store.find_by_id(&id).await {
        Ok(Some(entity)) => (StatusCode::OK, Json(ApiResponse::new(entity))).into_response(),
        Ok(None) => not_found(&id),
        Err(e) => {
            error!(id = %id, error = %e, "Identity lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string())
        }
    }
}

/// PUT /identities/{id} - insert or replace the whole document.
pub async fn put_handler(
    State(store): State<Arc<MemoryEntityStore>>,
    Path(id): Path<String>,
    Json(mut doc): Json<Map<String, Value>>,
) -> Response {
    doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
    let entity = match Entity::try_from(doc) {
        Ok(entity) => entity,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "INVALID_DOCUMENT", e.to_string()),
    };

    let created = store.upsert(entity.clone()).await.is_none();
    info!(id = %id, created, lifecycle = ?entity.lifecycle(), "Identity written");
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let mut body = ApiResponse::new(entity);
    body.status_code = status.as_u16();
    (status, Json(body)).into_response()
}

/// PATCH /identities/{id} - set the given dotted paths.
pub async fn patch_handler(
    State(store): State<Arc<MemoryEntityStore>>,
    Path(id): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> Response {
    if fields.contains_key(ID_FIELD) {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_DOCUMENT",
            "'_id' cannot be changed",
        );
    }
    match store.find_by_id(&id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found(&id),
        Err(e) => {
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string())
        }
    }

    match store.update(&id, &Update::from_document(&fields)).await {
        Ok((before, after)) => {
            info!(
                id = %id,
                from = ?before.lifecycle(),
                to = ?after.lifecycle(),
                "Identity updated"
            );
            (StatusCode::OK, Json(ApiResponse::new(after))).into_response()
        }
        Err(e) => {
            error!(id = %id, error = %e, "Identity update failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", e.to_string())
        }
    }
}
