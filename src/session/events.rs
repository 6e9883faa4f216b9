use std::path::PathBuf;
use tokio::sync::broadcast;
use tracing::{error, info};
use uuid::Uuid;

use super::state::{RecordingResult, SessionCell};
use crate::backend::BackendId;
use crate::error::CaptureError;

const EVENT_CAPACITY: usize = 512;

/// Notification delivered to capture observers
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started {
        session_id: Uuid,
        backend: BackendId,
        output_path: PathBuf,
    },
    AudioData {
        session_id: Uuid,
        bytes: Vec<u8>,
    },
    Finished {
        session_id: Uuid,
        file_path: PathBuf,
    },
    Error {
        session_id: Uuid,
        error: CaptureError,
    },
}

impl CaptureEvent {
    pub fn session_id(&self) -> Uuid {
        match self {
            CaptureEvent::Started { session_id, .. }
            | CaptureEvent::AudioData { session_id, .. }
            | CaptureEvent::Finished { session_id, .. }
            | CaptureEvent::Error { session_id, .. } => *session_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CaptureEvent::Finished { .. } | CaptureEvent::Error { .. })
    }
}

/// Fan-out of capture events to any number of subscribers
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: CaptureEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Session state plus the bus it reports on, shared by both capture paths
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub cell: SessionCell,
    pub events: EventBus,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self, session_id: Uuid, backend: BackendId, output_path: PathBuf) {
        info!(
            "Recording started: session={} backend={} output={}",
            session_id,
            backend,
            output_path.display()
        );
        self.events.emit(CaptureEvent::Started {
            session_id,
            backend,
            output_path,
        });
    }

    pub fn audio_data(&self, session_id: Uuid, bytes: Vec<u8>) {
        self.events.emit(CaptureEvent::AudioData { session_id, bytes });
    }

    /// Conclude the session and emit its single terminal event
    ///
    /// Returns `false` (and emits nothing) when the session already ended.
    pub fn finish(&self, session_id: Uuid, result: RecordingResult) -> bool {
        if !self.cell.conclude(session_id, result.clone()) {
            return false;
        }

        match result {
            RecordingResult::Finished { file_path } => {
                info!(
                    "Recording finished: session={} file={}",
                    session_id,
                    file_path.display()
                );
                self.events.emit(CaptureEvent::Finished {
                    session_id,
                    file_path,
                });
            }
            RecordingResult::Failed { error } => {
                error!(
                    "Recording failed: session={} kind={:?}: {}",
                    session_id,
                    error.kind(),
                    error
                );
                self.events.emit(CaptureEvent::Error { session_id, error });
            }
        }
        true
    }

    pub fn fail(&self, session_id: Uuid, error: CaptureError) -> bool {
        self.finish(session_id, RecordingResult::Failed { error })
    }
}
