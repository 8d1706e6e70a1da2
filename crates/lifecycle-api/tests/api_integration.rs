//! Integration tests for the lifecycle HTTP API.
//!
//! Run with: `cargo test --package lifecycle-api --test api_integration`

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use http_body_util::BodyExt;
use lifecycle_api::{create_api_router, create_api_state, create_identity_router};
use lifecycle_engine::{
    spawn_event_loop, EngineConfig, HistoryStore, LifecycleEngine, MemoryEntityStore,
    MemoryHistoryStore,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

/// A router over an engine reading configuration from a fresh temporary directory.
struct TestApi {
    _tmp: TempDir,
    config_dir: PathBuf,
    history: Arc<MemoryHistoryStore>,
    router: Router,
}

fn create_test_api() -> TestApi {
    let tmp = tempfile::tempdir().unwrap();
    let config_dir = tmp.path().join("lifecycle");
    fs::create_dir_all(config_dir.join("rules")).unwrap();
    fs::write(
        config_dir.join("states.yml"),
        "states:\n  - key: Z\n    label: Suspended\n    description: Temporarily suspended\n",
    )
    .unwrap();
    fs::write(
        config_dir.join("rules/10-official.yml"),
        "identities:\n  - sources: [OFFICIAL]\n    rules:\n      department: IT\n    target: MANUAL\n  - sources: [OFFICIAL]\n    trigger: 90d\n    target: ARCHIVED\n",
    )
    .unwrap();

    let history = Arc::new(MemoryHistoryStore::new());
    let engine = LifecycleEngine::new(
        EngineConfig::with_config_dir(&config_dir),
        Arc::new(MemoryEntityStore::new()),
        history.clone(),
    );
    let router = create_api_router(create_api_state(Arc::new(engine)));

    TestApi {
        _tmp: tmp,
        config_dir,
        history,
        router,
    }
}

/// Like [`create_test_api`], plus `/identities` writes feeding the dispatcher.
fn create_test_api_with_identities() -> TestApi {
    let api = create_test_api();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let store = Arc::new(MemoryEntityStore::new().with_events(tx));
    let engine = Arc::new(LifecycleEngine::new(
        EngineConfig::with_config_dir(&api.config_dir),
        store.clone(),
        api.history.clone(),
    ));
    spawn_event_loop(engine.clone(), rx);
    let router = create_api_router(create_api_state(engine)).merge(create_identity_router(store));
    TestApi { router, ..api }
}

/// Helper to send a JSON body.
async fn send_json(router: &Router, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    into_json(router.clone().oneshot(request).await.unwrap()).await
}

/// Helper to send a request and return the raw response.
async fn send(router: &Router, method: Method, uri: &str, etag: Option<&str>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(etag) = etag {
        builder = builder.header(header::IF_NONE_MATCH, etag);
    }
    let request = builder.body(Body::empty()).unwrap();
    router.clone().oneshot(request).await.unwrap()
}

/// Helper to make a GET request.
async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    into_json(send(router, Method::GET, uri, None).await).await
}

async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!(null));
    (status, json)
}

fn touch(path: &Path, secs_ahead: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs_ahead))
        .unwrap();
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let api = create_test_api();
    // Health does not pass the freshness gate; load through a lifecycle route first.
    let _ = get(&api.router, "/lifecycle/stats").await;

    let (status, json) = get(&api.router, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["status"], "ok");
    assert_eq!(json["data"]["sources"], 1);
    assert_eq!(json["data"]["rules"], 2);
    assert_eq!(json["data"]["customStates"], 1);
}

#[tokio::test]
async fn test_unknown_route_returns_404() {
    let api = create_test_api();
    let (status, _) = get(&api.router, "/lifecycle/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// States
// =============================================================================

#[tokio::test]
async fn test_states_lists_builtin_then_custom() {
    let api = create_test_api();
    let response = send(&api.router, Method::GET, "/lifecycle/states", None).await;

    let headers = response.headers().clone();
    assert_eq!(
        headers.get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=1, must-revalidate"
    );
    assert!(headers.get(header::LAST_MODIFIED).is_some());
    let etag = headers.get(header::ETAG).unwrap().to_str().unwrap();
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let (status, json) = into_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["statusCode"], 200);
    let keys: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["key"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(keys, vec!["P", "A", "O", "W", "I", "D", "M", "X", "Z"]);
}

#[tokio::test]
async fn test_states_honors_if_none_match_and_follows_edits() {
    let api = create_test_api();
    let first = send(&api.router, Method::GET, "/lifecycle/states", None).await;
    let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

    let cached = send(&api.router, Method::GET, "/lifecycle/states", Some(&etag)).await;
    assert_eq!(cached.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(cached.headers()[header::ETAG].to_str().unwrap(), etag);
    let body = cached.into_body().collect().await.unwrap().to_bytes();
    assert!(body.is_empty());

    let states = api.config_dir.join("states.yml");
    fs::write(
        &states,
        "states:\n  - key: Z\n    label: Suspended\n    description: Temporarily suspended\n  - key: Q\n    label: Quarantined\n    description: Under review\n",
    )
    .unwrap();
    touch(&states, 5);

    let refreshed = send(&api.router, Method::GET, "/lifecycle/states", Some(&etag)).await;
    let new_etag = refreshed.headers()[header::ETAG].to_str().unwrap().to_string();
    assert_ne!(new_etag, etag);
    let (status, json) = into_json(refreshed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_custom_states_only() {
    let api = create_test_api();
    let (status, json) = get(&api.router, "/lifecycle/states/custom").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["data"],
        json!([{ "key": "Z", "label": "Suspended", "description": "Temporarily suspended" }])
    );
}

// =============================================================================
// History
// =============================================================================

#[tokio::test]
async fn test_identity_history_is_paginated_newest_first() {
    let api = create_test_api();
    for state in ["A", "O", "M"] {
        api.history.record("u1", state, Utc::now()).await.unwrap();
    }
    api.history.record("u2", "A", Utc::now()).await.unwrap();

    let (status, json) = get(&api.router, "/lifecycle/identity/u1?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 3);
    let states: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["lifecycle"].as_str().unwrap())
        .collect();
    assert_eq!(states, vec!["M", "O"]);
    assert_eq!(json["data"][0]["refId"], "u1");

    let (_, json) = get(&api.router, "/lifecycle/identity/u1?skip=2&limit=2").await;
    assert_eq!(json["data"][0]["lifecycle"], "A");
}

#[tokio::test]
async fn test_identity_without_history_is_empty() {
    let api = create_test_api();
    let (status, json) = get(&api.router, "/lifecycle/identity/ghost").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);
    assert_eq!(json["data"], json!([]));
}

#[tokio::test]
async fn test_stats_and_recent() {
    let api = create_test_api();
    api.history.record("u1", "O", Utc::now()).await.unwrap();
    api.history.record("u2", "O", Utc::now()).await.unwrap();
    api.history.record("u1", "M", Utc::now()).await.unwrap();

    let (status, json) = get(&api.router, "/lifecycle/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json["data"],
        json!([{ "lifecycle": "M", "count": 1 }, { "lifecycle": "O", "count": 2 }])
    );
    assert!(json.get("total").is_none());

    let (_, json) = get(&api.router, "/lifecycle/recent?limit=1").await;
    assert_eq!(json["total"], 3);
    assert_eq!(json["data"][0]["refId"], "u1");
    assert_eq!(json["data"][0]["lifecycle"], "M");
}

// =============================================================================
// Configuration
// =============================================================================

#[tokio::test]
async fn test_sources_lists_rules_in_evaluation_order() {
    let api = create_test_api();
    let (status, json) = get(&api.router, "/lifecycle/sources").await;

    assert_eq!(status, StatusCode::OK);
    let entries = json["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["source"], "O");
    assert_eq!(entries[0]["target"], "M");
    assert_eq!(entries[0]["origin"], "10-official.yml#0");
    assert!(entries[0].get("trigger").is_none());
    assert_eq!(entries[1]["trigger"], "90d");
    assert_eq!(entries[1]["position"], 1);
}

#[tokio::test]
async fn test_reload_reports_violations_and_keeps_rules() {
    let api = create_test_api();
    let (status, json) = into_json(send(&api.router, Method::POST, "/lifecycle/reload", None).await).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["rules"], 2);

    let bad = api.config_dir.join("rules/20-bad.yml");
    fs::write(&bad, "identities:\n  - sources: [NOWHERE]\n    target: O\n    trigger: 1\n").unwrap();

    let (status, json) = into_json(send(&api.router, Method::POST, "/lifecycle/reload", None).await).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["statusCode"], 422);
    assert_eq!(json["code"], "CONFIG_INVALID");
    let message = json["message"].as_str().unwrap();
    assert!(message.contains("20-bad.yml"), "{message}");
    assert!(message.contains("isKnownState"), "{message}");

    let (_, json) = get(&api.router, "/lifecycle/sources").await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}

// =============================================================================
// Identities
// =============================================================================

#[tokio::test]
async fn test_identity_write_cascades_through_dispatcher() {
    let api = create_test_api_with_identities();

    let (status, json) = send_json(
        &api.router,
        Method::PUT,
        "/identities/u1",
        json!({ "lifecycle": "A", "department": "IT" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["data"]["_id"], "u1");

    let (status, json) = send_json(
        &api.router,
        Method::PATCH,
        "/identities/u1",
        json!({ "lifecycle": "O" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["lifecycle"], "O");

    let mut lifecycle = Value::Null;
    for _ in 0..200 {
        let (_, json) = get(&api.router, "/identities/u1").await;
        lifecycle = json["data"]["lifecycle"].clone();
        if lifecycle == "M" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(lifecycle, "M");

    let (_, json) = get(&api.router, "/lifecycle/identity/u1").await;
    let states: Vec<_> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["lifecycle"].as_str().unwrap())
        .collect();
    // Newest first: creation (A), manual move (O), rule (M).
    assert_eq!(states, vec!["M", "O", "A"]);
}

#[tokio::test]
async fn test_identity_patch_unknown_returns_404() {
    let api = create_test_api_with_identities();
    let (status, json) = send_json(
        &api.router,
        Method::PATCH,
        "/identities/ghost",
        json!({ "lifecycle": "O" }),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (status, _) = get(&api.router, "/identities/ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
