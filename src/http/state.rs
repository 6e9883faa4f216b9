use crate::orchestrator::CaptureOrchestrator;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<CaptureOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Arc<CaptureOrchestrator>) -> Self {
        Self { orchestrator }
    }
}
