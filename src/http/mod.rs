//! HTTP API server for external control
//!
//! This module provides a REST API over the capture orchestrator:
//! - POST /capture/start, POST /capture/stop - Issue start/stop (202)
//! - GET /capture/status - Current session snapshot
//! - GET /devices, GET|PUT /devices/preferred - Input devices
//! - GET /backend, POST /backend/reinitialize - Backend detection
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
