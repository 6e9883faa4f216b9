use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/capture/start", post(handlers::start_capture))
        .route("/capture/stop", post(handlers::stop_capture))
        .route("/capture/status", get(handlers::capture_status))
        // Input devices
        .route("/devices", get(handlers::list_devices))
        .route(
            "/devices/preferred",
            get(handlers::get_preferred_device).put(handlers::set_preferred_device),
        )
        // Backend detection
        .route("/backend", get(handlers::current_backend))
        .route("/backend/reinitialize", post(handlers::reinitialize_backend))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
