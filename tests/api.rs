use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use export_orchestrator::admission::AllowAll;
use export_orchestrator::api::{router, AppState};
use export_orchestrator::blob_store::LocalBlobStore;
use export_orchestrator::progress_hub::ProgressHub;
use export_orchestrator::store::SqliteJobStore;

async fn test_app() -> (axum::Router, tempfile::TempDir) {
    let store = Arc::new(SqliteJobStore::connect("sqlite::memory:").await.unwrap());
    let dir = tempfile::tempdir().unwrap();
    let blob_store = Arc::new(LocalBlobStore::new(dir.path().to_path_buf()));
    let hub = Arc::new(ProgressHub::new(32));
    let state = AppState {
        store,
        hub,
        blob_store,
        admission: Arc::new(AllowAll),
        websocket_keepalive: Duration::from_secs(30),
    };
    (router(state), dir)
}

fn json_request(method: &str, uri: &str, owner: Option<&str>, body: serde_json::Value) -> Request<axum::body::Body> {
    let mut builder = Request::builder().method(method).uri(uri).header("content-type", "application/json");
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    builder.body(axum::body::Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_returns_200() {
    let (app, _dir) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/healthz").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn submit_without_owner_header_is_rejected() {
    let (app, _dir) = test_app().await;
    let body = serde_json::json!({
        "project_ref": "proj-1",
        "kind": "framing",
        "params": {
            "source_ref": "blob://x",
            "crop_keyframes": [{"source_time": 0.0, "rect": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0}}],
            "target_aspect_ratio": {"width": 9, "height": 16},
            "target_frame_rate": 30.0,
            "audio_include": false
        }
    });
    let response = app.oneshot(json_request("POST", "/exports", None, body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn submit_with_empty_crop_keyframes_is_rejected_with_no_job_created() {
    let (app, _dir) = test_app().await;
    let body = serde_json::json!({
        "project_ref": "proj-1",
        "kind": "framing",
        "params": {
            "source_ref": "blob://x",
            "crop_keyframes": [],
            "target_aspect_ratio": {"width": 9, "height": 16},
            "target_frame_rate": 30.0,
            "audio_include": false
        }
    });
    let response = app.clone().oneshot(json_request("POST", "/exports", Some("owner-1"), body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let list = app
        .oneshot(
            Request::builder()
                .uri("/projects/proj-1/exports")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(list.status(), StatusCode::OK);
    let jobs = body_json(list).await;
    assert!(jobs.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn submit_then_get_round_trips_and_cancel_is_idempotent() {
    let (app, _dir) = test_app().await;
    let body = serde_json::json!({
        "project_ref": "proj-1",
        "kind": "framing",
        "params": {
            "source_ref": "blob://x",
            "crop_keyframes": [{"source_time": 0.0, "rect": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0}}],
            "target_aspect_ratio": {"width": 9, "height": 16},
            "target_frame_rate": 30.0,
            "audio_include": false
        }
    });
    let submit_response = app.clone().oneshot(json_request("POST", "/exports", Some("owner-1"), body)).await.unwrap();
    assert_eq!(submit_response.status(), StatusCode::CREATED);
    let submitted = body_json(submit_response).await;
    let job_id = submitted["job_id"].as_str().unwrap().to_string();

    let get_response = app
        .clone()
        .oneshot(Request::builder().uri(format!("/exports/{job_id}")).body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(get_response.status(), StatusCode::OK);
    let snapshot = body_json(get_response).await;
    assert_eq!(snapshot["status"], "pending");

    let cancel_once = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/exports/{job_id}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cancel_once.status(), StatusCode::OK);
    let first_cancel = body_json(cancel_once).await;
    assert_eq!(first_cancel["status"], "cancelled");

    let cancel_twice = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/exports/{job_id}"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(cancel_twice.status(), StatusCode::OK);
    let second_cancel = body_json(cancel_twice).await;
    assert_eq!(second_cancel["status"], "cancelled");
}

#[tokio::test]
async fn download_before_complete_returns_conflict() {
    let (app, _dir) = test_app().await;
    let body = serde_json::json!({
        "project_ref": "proj-1",
        "kind": "framing",
        "params": {
            "source_ref": "blob://x",
            "crop_keyframes": [{"source_time": 0.0, "rect": {"x": 0.0, "y": 0.0, "width": 1.0, "height": 1.0}}],
            "target_aspect_ratio": {"width": 9, "height": 16},
            "target_frame_rate": 30.0,
            "audio_include": false
        }
    });
    let submit_response = app.clone().oneshot(json_request("POST", "/exports", Some("owner-1"), body)).await.unwrap();
    let submitted = body_json(submit_response).await;
    let job_id = submitted["job_id"].as_str().unwrap();

    let download = app
        .oneshot(
            Request::builder()
                .uri(format!("/exports/{job_id}/download"))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(download.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn get_unknown_job_returns_404() {
    let (app, _dir) = test_app().await;
    let response = app
        .oneshot(Request::builder().uri("/exports/does-not-exist").body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
