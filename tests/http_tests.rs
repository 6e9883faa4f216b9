// Integration tests for the HTTP control API

mod common;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::{orchestrator, FakeRunner};
use loqa_capture::{
    create_router, AppState, BackendCatalog, BackendId, BridgeCommand, ChannelTransport,
    MemoryPreferenceStore, MessageTransport, NullTransport, Platform,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app(runner: Arc<FakeRunner>, transport: Arc<dyn MessageTransport>, catalog: BackendCatalog, dir: &Path) -> Router {
    let orchestrator = orchestrator(
        catalog,
        runner,
        transport,
        Arc::new(MemoryPreferenceStore::default()),
        dir,
    );
    create_router(AppState::new(Arc::new(orchestrator)))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_health_and_idle_status() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = app(FakeRunner::new(), Arc::new(NullTransport), BackendCatalog::new(Platform::Linux), dir.path());

    let (status, body) = call(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["platform"], "linux");

    let (status, body) = call(&app, Method::GET, "/capture/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "idle");
    assert_eq!(body["is_recording"], false);

    Ok(())
}

#[tokio::test]
async fn test_stop_while_idle_conflicts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = app(FakeRunner::new(), Arc::new(NullTransport), BackendCatalog::new(Platform::Linux), dir.path());

    let (status, body) = call(&app, Method::POST, "/capture/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("No recording session"));

    Ok(())
}

#[tokio::test]
async fn test_no_backend_is_service_unavailable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let app = app(FakeRunner::new(), Arc::new(NullTransport), BackendCatalog::new(Platform::Linux), dir.path());

    let (status, body) = call(&app, Method::GET, "/backend", None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "no-backend-available");
    assert!(body["message"].as_str().unwrap().contains("native-capture"));

    Ok(())
}

#[tokio::test]
async fn test_backend_reinitialize_picks_up_new_tool() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = FakeRunner::new();
    let app = app(runner.clone(), Arc::new(NullTransport), BackendCatalog::new(Platform::Linux), dir.path());

    let (status, _) = call(&app, Method::GET, "/backend", None).await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    runner.ok("ffmpeg", "ffmpeg version 6.1");
    let (status, body) = call(&app, Method::POST, "/backend/reinitialize", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["backend"], "transcoder");

    Ok(())
}

#[tokio::test]
async fn test_devices_and_preferred_device() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runner = FakeRunner::new();
    runner.ok_when("arecord", "-L", "plughw:CARD=USB,DEV=0\n    USB Audio Device, USB Audio\n");
    let app = app(runner, Arc::new(NullTransport), BackendCatalog::new(Platform::Linux), dir.path());

    let (status, body) = call(&app, Method::GET, "/devices", None).await?;
    assert_eq!(status, StatusCode::OK);
    let devices = body["devices"].as_array().unwrap();
    assert!(devices.iter().any(|d| d["id"] == "plughw:CARD=USB,DEV=0"));

    let (status, body) = call(&app, Method::GET, "/devices/preferred", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"], Value::Null);

    let (status, body) = call(
        &app,
        Method::PUT,
        "/devices/preferred",
        Some(json!({ "device": "plughw:CARD=USB,DEV=0" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"], "plughw:CARD=USB,DEV=0");

    // Labels are rejected and leave the stored id alone
    let (status, _) = call(
        &app,
        Method::PUT,
        "/devices/preferred",
        Some(json!({ "device": "USB Audio (2)" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, body) = call(&app, Method::GET, "/devices/preferred", None).await?;
    assert_eq!(body["device"], "plughw:CARD=USB,DEV=0");

    // A null device goes back to automatic selection
    let (status, body) = call(&app, Method::PUT, "/devices/preferred", Some(json!({ "device": null }))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["device"], Value::Null);

    Ok(())
}

#[tokio::test]
async fn test_start_is_accepted_once() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (transport, mut host) = ChannelTransport::pair();
    let catalog = BackendCatalog::new(Platform::Linux).with_order(vec![BackendId::BrowserEmbedded]);
    let app = app(FakeRunner::new(), Arc::new(transport), catalog, dir.path());

    let (status, body) = call(&app, Method::POST, "/capture/start", None).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "starting");
    assert_eq!(body["backend"], "browser-embedded");

    let command = tokio::time::timeout(Duration::from_secs(5), host.recv_command())
        .await?
        .unwrap();
    assert!(matches!(command, BridgeCommand::StartCapture { .. }));

    let (status, _) = call(&app, Method::POST, "/capture/start", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(&app, Method::POST, "/capture/stop", None).await?;
    assert_eq!(status, StatusCode::ACCEPTED);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_starts_accept_exactly_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (transport, _host) = ChannelTransport::pair();
    let catalog = BackendCatalog::new(Platform::Linux).with_order(vec![BackendId::BrowserEmbedded]);
    let app = app(FakeRunner::new(), Arc::new(transport), catalog, dir.path());

    let (first, second) = tokio::join!(
        call(&app, Method::POST, "/capture/start", None),
        call(&app, Method::POST, "/capture/start", None),
    );
    let mut statuses = vec![first?.0, second?.0];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::ACCEPTED, StatusCode::CONFLICT]);

    Ok(())
}
