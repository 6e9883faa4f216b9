use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::CaptureEvent;
use super::state::SessionSnapshot;
use crate::backend::{BackendId, CaptureFormat};

/// Everything a capture path needs to launch one session
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub session_id: Uuid,
    pub backend: BackendId,
    /// Resolved input device argument
    pub device: String,
    pub output_path: PathBuf,
    pub format: CaptureFormat,
}

/// One way of running a capture session
///
/// Implementations share the session state machine: `start` is called for
/// a session already in `Starting` and reports every failure as the
/// session's terminal error event rather than a return value. Neither
/// call waits for the recording to end.
#[async_trait]
pub trait CaptureSession: Send + Sync {
    async fn start(&self, request: CaptureRequest);

    async fn stop(&self);

    fn snapshot(&self) -> SessionSnapshot;

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent>;
}
