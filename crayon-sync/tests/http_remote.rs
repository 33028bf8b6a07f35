//! HTTP remote integration tests against a mock server.

use std::sync::Arc;

use chrono::Utc;
use crayon_core::{CanvasAction, CanvasProgress, Color, ProgressKey};
use crayon_sync::{
    BlobStore, CanvasSession, HttpBlobStore, HttpProgressRemote, ProgressRemote, ProgressUpload,
    RemoteError, SessionConfig, SyncOutcome,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// Fixtures
// ============================================================================

fn key() -> ProgressKey {
    ProgressKey::new("u1", "dino")
}

fn record(version: u64, fills: u8) -> CanvasProgress {
    CanvasProgress {
        actions: (0..fills)
            .map(|i| CanvasAction::fill(5.0, 5.0, Color::rgb(i, 0, 0)))
            .collect(),
        version,
        last_updated: Utc::now(),
        canvas_width: Some(800),
        canvas_height: Some(600),
        preview_url: None,
    }
}

fn remote_for(server: &MockServer) -> HttpProgressRemote {
    HttpProgressRemote::new(&server.uri()).expect("client")
}

// ============================================================================
// Progress remote
// ============================================================================

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_fetch_missing_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/u1/dino"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let fetched = remote_for(&server).fetch(&key()).await.expect("fetch");
    assert!(fetched.is_none());
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_fetch_parses_record() {
    let server = MockServer::start().await;
    let stored = record(4, 3);
    Mock::given(method("GET"))
        .and(path("/progress/u1/kid/dino"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&stored))
        .mount(&server)
        .await;

    let key = key().with_profile("kid");
    let fetched = remote_for(&server)
        .fetch(&key)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(fetched, stored);
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_save_sends_base_version() {
    let server = MockServer::start().await;
    let stored = record(3, 1);
    Mock::given(method("PUT"))
        .and(path("/progress/u1/dino"))
        .and(body_partial_json(json!({
            "baseVersion": 2,
            "canvasWidth": 800,
            "canvasHeight": 600
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&stored))
        .expect(1)
        .mount(&server)
        .await;

    let upload = ProgressUpload::new(stored.actions.clone(), 2).with_dimensions(Some((800, 600)));
    let saved = remote_for(&server)
        .save(&key(), upload)
        .await
        .expect("save");
    assert_eq!(saved.version, 3);
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_save_conflict_is_stale_version() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/progress/u1/dino"))
        .respond_with(ResponseTemplate::new(409).set_body_json(record(5, 5)))
        .mount(&server)
        .await;

    let err = remote_for(&server)
        .save(&key(), ProgressUpload::new(Vec::new(), 3))
        .await
        .expect_err("stale");
    match err {
        RemoteError::StaleVersion {
            base_version,
            stored,
        } => {
            assert_eq!(base_version, 3);
            assert_eq!(stored.version, 5);
            assert_eq!(stored.actions.len(), 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_server_error_is_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = remote_for(&server).fetch(&key()).await.expect_err("503");
    match &err {
        RemoteError::Status { status, message } => {
            assert_eq!(*status, 503);
            assert_eq!(message, "maintenance");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.is_retryable());
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_malformed_body_is_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"version\": \"nope\"}"))
        .mount(&server)
        .await;

    let err = remote_for(&server).fetch(&key()).await.expect_err("bad body");
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_delete_missing_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/progress/u1/dino"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    remote_for(&server).delete(&key()).await.expect("delete");
}

#[tokio::test]
async fn test_unreachable_server_is_offline() {
    // Nothing listens on the discard port
    let remote = HttpProgressRemote::new("http://127.0.0.1:9/").expect("client");
    let err = remote.fetch(&key()).await.expect_err("unreachable");
    assert!(err.is_offline());
}

// ============================================================================
// Blob store
// ============================================================================

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_blob_put_returns_url() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/blobs/previews/u1/dino.png"))
        .and(header("content-type", "image/png"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "url": "https://cdn.example/previews/u1/dino.png" })),
        )
        .mount(&server)
        .await;

    let store = HttpBlobStore::new(&server.uri()).expect("client");
    let url = store
        .put("previews/u1/dino.png", vec![0x89, b'P', b'N', b'G'], "image/png")
        .await
        .expect("put");
    assert_eq!(url, "https://cdn.example/previews/u1/dino.png");
}

// ============================================================================
// Session over HTTP
// ============================================================================

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_session_saves_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/progress/u1/dino"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/progress/u1/dino"))
        .and(body_partial_json(json!({ "baseVersion": 0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(record(1, 1)))
        .expect(1)
        .mount(&server)
        .await;

    let session = CanvasSession::new(
        key(),
        Arc::new(remote_for(&server)),
        SessionConfig::default(),
    );
    session
        .record(CanvasAction::fill(5.0, 5.0, Color::rgb(0, 0, 0)))
        .await;

    let outcome = session.sync(None).await.expect("sync");
    assert_eq!(outcome, SyncOutcome::Saved { version: 1 });
    assert_eq!(session.version(), 1);
}
