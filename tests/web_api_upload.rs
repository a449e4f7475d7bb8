//! Web API Upload Tests
//!
//! Integration tests for the document upload endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use minutag::admission::{AdmissionController, AdmissionLimits};
use minutag::config::DriveBackend;
use minutag::drive::{DriveCall, DriveClient, InMemoryDrive};
use minutag::upload::UploadOrchestrator;
use minutag::web::handlers::AppState;
use minutag::web::router::{create_health_router, create_router};
use minutag::{Config, WebServer};
use serde_json::{json, Value};

const ROOT: &str = "root-folder";
const MAX_BODY: usize = 1024;

/// Create a test server backed by the given drive.
fn create_test_server(drive: Option<Arc<InMemoryDrive>>, limits: AdmissionLimits) -> TestServer {
    let admission = Arc::new(AdmissionController::new(limits));
    let drive = drive.map(|d| d as Arc<dyn DriveClient>);
    let orchestrator = Arc::new(UploadOrchestrator::new(admission, drive, ROOT));
    let app_state = Arc::new(AppState::new(orchestrator));

    let router = create_router(app_state, MAX_BODY).merge(create_health_router());
    TestServer::new(router).expect("Failed to create test server")
}

fn default_limits() -> AdmissionLimits {
    AdmissionLimits::new(5, 50)
}

#[tokio::test]
async fn test_upload_creates_owner_folder() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({
            "filename": "ata-2024.txt",
            "content": "minutes of the meeting",
            "owner": "Silva"
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["fileName"], "ata-2024.txt");
    assert_eq!(body["owner"], "Silva");
    assert!(body["fileId"].as_str().is_some_and(|id| !id.is_empty()));

    let calls = drive.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(&calls[1], DriveCall::CreateFolder { name, parent_id }
        if name == "Silva" && parent_id == ROOT));
    assert!(matches!(&calls[2], DriveCall::UploadFile { name, .. } if name == "ata-2024.txt"));

    let files = drive.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].content, "minutes of the meeting");
}

#[tokio::test]
async fn test_upload_reuses_existing_folder() {
    let drive = Arc::new(InMemoryDrive::new());
    let folder_id = drive.insert_folder("Silva", ROOT);
    let server = create_test_server(Some(drive.clone()), default_limits());

    server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "content": "x", "owner": "Silva" }))
        .await
        .assert_status_ok();

    assert!(!drive
        .calls()
        .iter()
        .any(|c| matches!(c, DriveCall::CreateFolder { .. })));
    assert_eq!(drive.files()[0].parent_id, folder_id);
}

#[tokio::test]
async fn test_upload_without_owner_uses_placeholder_folder() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "content": "x", "owner": "   " }))
        .await;

    response.assert_status_ok();
    let folders = drive.folders();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0].name, minutag::UNNAMED_OWNER_FOLDER);
}

#[tokio::test]
async fn test_upload_missing_content() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "owner": "Silva" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("content"));
    assert!(drive.calls().is_empty());
}

#[tokio::test]
async fn test_upload_empty_filename() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "", "content": "x" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(drive.calls().is_empty());
}

#[tokio::test]
async fn test_upload_invalid_json() {
    let server = create_test_server(Some(Arc::new(InMemoryDrive::new())), default_limits());

    let response = server
        .post("/upload-document")
        .text("{not json")
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(response.json::<Value>()["ok"], false);
}

#[tokio::test]
async fn test_upload_payload_too_large() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "big.txt", "content": "x".repeat(MAX_BODY * 2) }))
        .await;

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert!(drive.calls().is_empty());
}

#[tokio::test]
async fn test_upload_unconfigured_drive() {
    let server = create_test_server(None, default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "content": "x" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["ok"], false);
    assert!(body["error"].as_str().unwrap().contains("not configured"));
}

#[tokio::test]
async fn test_upload_remote_failure() {
    let drive = Arc::new(InMemoryDrive::new());
    drive.fail_next_upload("quota exceeded");
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "content": "x", "owner": "Silva" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.json::<Value>()["error"]
        .as_str()
        .unwrap()
        .contains("quota exceeded"));
    // The folder created before the failure stays.
    assert_eq!(drive.folders().len(), 1);
    assert!(drive.files().is_empty());
}

#[tokio::test]
async fn test_legacy_path_accepts_professor_field() {
    let drive = Arc::new(InMemoryDrive::new());
    let server = create_test_server(Some(drive.clone()), default_limits());

    let response = server
        .post("/minutag/upload-txt")
        .json(&json!({ "filename": "a.txt", "content": "x", "professor": "Souza" }))
        .await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["owner"], "Souza");
    assert_eq!(drive.folders()[0].name, "Souza");
}

#[tokio::test]
async fn test_health() {
    let server = create_test_server(None, default_limits());

    let response = server.get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.text(), "ok");
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_queue_full_returns_429() {
    let mut config = Config::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = 0;
    config.admission.max_concurrency = 1;
    config.admission.max_queue = 1;
    config.admission.retry_after_secs = 7;
    config.drive.backend = DriveBackend::Memory;

    let drive: Arc<dyn DriveClient> = Arc::new(InMemoryDrive::new().stalled());
    let server = WebServer::with_drive(&config, Some(drive), ROOT).unwrap();
    let admission = server.app_state().orchestrator.admission().clone();
    let addr = server.run_with_addr().await.unwrap();
    let url = format!("http://{}/upload-document", addr);
    let client = reqwest::Client::new();

    let send = |name: &'static str| {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move {
            client
                .post(url)
                .json(&json!({ "filename": name, "content": "x", "owner": "Silva" }))
                .send()
                .await
        })
    };

    let active = send("active.txt");
    wait_until(|| admission.stats().active == 1).await;
    let queued = send("queued.txt");
    wait_until(|| admission.stats().queued == 1).await;

    let rejected = client
        .post(&url)
        .json(&json!({ "filename": "rejected.txt", "content": "x" }))
        .send()
        .await
        .unwrap();

    assert_eq!(rejected.status(), reqwest::StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        rejected.headers()["retry-after"].to_str().unwrap(),
        "7"
    );
    let body: Value = rejected.json().await.unwrap();
    assert_eq!(body["ok"], false);

    let stats = admission.stats();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.queued, 1);
    assert!(!active.is_finished());
    assert!(!queued.is_finished());

    active.abort();
    queued.abort();
}

#[tokio::test]
async fn test_queue_timeout_returns_503() {
    let limits = AdmissionLimits::new(1, 5)
        .with_retry_after(2)
        .with_queue_timeout(Duration::from_millis(50));
    let admission = Arc::new(AdmissionController::new(limits));
    let _held = admission.acquire().await.unwrap();

    let drive: Arc<dyn DriveClient> = Arc::new(InMemoryDrive::new());
    let orchestrator = Arc::new(UploadOrchestrator::new(admission, Some(drive), ROOT));
    let router = create_router(Arc::new(AppState::new(orchestrator)), MAX_BODY);
    let server = TestServer::new(router).unwrap();

    let response = server
        .post("/upload-document")
        .json(&json!({ "filename": "a.txt", "content": "x" }))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.header("retry-after"), "2");
}

#[tokio::test]
async fn test_concurrent_uploads_same_owner_single_folder() {
    let drive = Arc::new(InMemoryDrive::new().with_latency(Duration::from_millis(5)));
    let server = Arc::new(create_test_server(
        Some(drive.clone()),
        AdmissionLimits::new(4, 50),
    ));

    let requests = (0..8).map(|i| {
        let server = server.clone();
        async move {
            server
                .post("/upload-document")
                .json(&json!({ "filename": format!("{i}.txt"), "content": "x", "owner": "Silva" }))
                .await
                .assert_status_ok();
        }
    });
    futures::future::join_all(requests).await;

    assert_eq!(drive.folders().len(), 1);
    assert_eq!(drive.files().len(), 8);
}
