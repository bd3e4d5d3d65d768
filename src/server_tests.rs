use super::*;
use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::Request;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::clock::ManualClock;
use crate::config::SettingsStore;
use crate::state::AppState;

fn test_state() -> (SharedState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SettingsStore::open(dir.path().join("settings.toml")).unwrap());
    let state = Arc::new(AppState::new(store, Arc::new(ManualClock::new(42))));
    (state, dir)
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn post_message(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/message")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_history_round_trip_over_http() {
    let (state, _dir) = test_state();

    let (_, empty) = call(router(state.clone()), post_message(json!({"type": "GET_SCAN_HISTORY"}))).await;
    assert_eq!(empty, json!({"history": []}));

    let (status, ack) = call(
        router(state.clone()),
        post_message(json!({"type": "LOG_SCAN", "itemId": "SKU1", "statusId": "OK", "result": "success"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack, json!({"ok": true}));

    let (_, history) = call(router(state.clone()), post_message(json!({"type": "GET_SCAN_HISTORY"}))).await;
    assert_eq!(
        history,
        json!({"history": [{"itemId": "SKU1", "statusId": "OK", "timestamp": 42, "result": "success"}]})
    );

    call(router(state.clone()), post_message(json!({"type": "CLEAR_SCAN_HISTORY"}))).await;
    let (_, cleared) = call(router(state), post_message(json!({"type": "GET_SCAN_HISTORY"}))).await;
    assert_eq!(cleared, json!({"history": []}));
}

#[tokio::test]
async fn test_unknown_message_is_client_error() {
    let (state, _dir) = test_state();
    let response = router(state)
        .oneshot(post_message(json!({"type": "NOPE"})))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_put_settings_saves_and_broadcasts() {
    let (state, _dir) = test_state();
    let mut rx = state.settings.subscribe();

    let mut settings = Settings::default();
    settings.overlay_duration = 3000;
    let request = Request::builder()
        .method("PUT")
        .uri("/settings")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&settings).unwrap()))
        .unwrap();
    let (status, _) = call(router(state.clone()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(rx.try_recv().unwrap().overlay_duration, 3000);

    let get = Request::builder().uri("/settings").body(Body::empty()).unwrap();
    let (_, body) = call(router(state), get).await;
    assert_eq!(body["overlayDuration"], 3000);
}

#[tokio::test]
async fn test_put_invalid_settings_is_rejected() {
    let (state, _dir) = test_state();
    let request = Request::builder()
        .method("PUT")
        .uri("/settings")
        .header("content-type", "application/json")
        .body(Body::from(json!({"overlayDuration": 0}).to_string()))
        .unwrap();
    let (status, body) = call(router(state), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("overlayDuration"));
}

#[tokio::test]
async fn test_site_config_resolves_against_current_settings() {
    let (state, _dir) = test_state();
    let mut settings = Settings::default();
    settings.sites.push(SiteConfig {
        id: "wms".into(),
        name: "WMS".into(),
        url_pattern: r"^https://wms\.example\.com/".into(),
        enabled: true,
        item_id_selector: "#product-scan".into(),
        status_id_selector: "#status-scan".into(),
        api_url_pattern: "/api/scan".into(),
    });
    state.settings.save(settings).unwrap();

    let hit = Request::builder()
        .uri("/site-config?url=https%3A%2F%2Fwms.example.com%2Fpick")
        .body(Body::empty())
        .unwrap();
    let (_, body) = call(router(state.clone()), hit).await;
    assert_eq!(body["id"], "wms");

    let miss = Request::builder()
        .uri("/site-config?url=https%3A%2F%2Fshop.example.com%2F")
        .body(Body::empty())
        .unwrap();
    let (_, body) = call(router(state), miss).await;
    assert_eq!(body, Value::Null);
}

#[tokio::test]
async fn test_settings_follower_applies_history_cap() {
    let (state, _dir) = test_state();
    for i in 0..5 {
        state.dispatch(RuntimeMessage::log_scan(&format!("SKU{i}"), "OK", Default::default()));
    }
    let follower = spawn_settings_follower(state.clone());

    let settings = Settings {
        max_history_entries: 2,
        ..Settings::default()
    };
    state.settings.save(settings).unwrap();

    for _ in 0..50 {
        if state.history().len() == 2 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert_eq!(state.history().len(), 2);
    follower.abort();
}
