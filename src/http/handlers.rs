use super::state::AppState;
use crate::backend::BackendId;
use crate::device::DeviceDescriptor;
use crate::error::CaptureError;
use crate::session::SessionSnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub platform: String,
}

#[derive(Debug, Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreferredDeviceBody {
    /// `None` (or `"auto"` on write) means automatic selection
    pub device: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BackendResponse {
    pub backend: BackendId,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn backend_response(result: Result<BackendId, CaptureError>) -> axum::response::Response {
    match result {
        Ok(backend) => (StatusCode::OK, Json(BackendResponse { backend })).into_response(),
        // `{ kind, message }` so clients can branch on the kind
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(e)).into_response(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            platform: state.orchestrator.platform().to_string(),
        }),
    )
}

/// POST /capture/start
/// Issues the start; the outcome arrives later as a session event
pub async fn start_capture(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;

    info!("Start requested over HTTP");
    if !orchestrator.start().await {
        warn!("Start requested while a session is active");
        return error_response(StatusCode::CONFLICT, "A recording session is already active");
    }

    (StatusCode::ACCEPTED, Json(orchestrator.status())).into_response()
}

/// POST /capture/stop
pub async fn stop_capture(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    if !orchestrator.status().phase.is_active() {
        return error_response(StatusCode::CONFLICT, "No recording session is active");
    }

    info!("Stop requested over HTTP");
    orchestrator.stop().await;

    (StatusCode::ACCEPTED, Json(orchestrator.status())).into_response()
}

/// GET /capture/status
pub async fn capture_status(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.orchestrator.status())
}

/// GET /devices
pub async fn list_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        devices: state.orchestrator.list_available_devices().await,
    })
}

/// GET /devices/preferred
pub async fn get_preferred_device(State(state): State<AppState>) -> Json<PreferredDeviceBody> {
    Json(PreferredDeviceBody {
        device: state.orchestrator.get_preferred_device(),
    })
}

/// PUT /devices/preferred
pub async fn set_preferred_device(
    State(state): State<AppState>,
    Json(body): Json<PreferredDeviceBody>,
) -> impl IntoResponse {
    let device = body.device.unwrap_or_default();
    match state.orchestrator.set_preferred_device(&device) {
        Ok(()) => (
            StatusCode::OK,
            Json(PreferredDeviceBody {
                device: state.orchestrator.get_preferred_device(),
            }),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, format!("{:#}", e)),
    }
}

/// GET /backend
pub async fn current_backend(State(state): State<AppState>) -> impl IntoResponse {
    backend_response(state.orchestrator.current_backend().await)
}

/// POST /backend/reinitialize
pub async fn reinitialize_backend(State(state): State<AppState>) -> impl IntoResponse {
    info!("Backend re-probe requested over HTTP");
    backend_response(state.orchestrator.reinitialize().await)
}
