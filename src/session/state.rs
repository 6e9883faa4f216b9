use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::backend::BackendId;
use crate::error::CaptureError;

/// Lifecycle phase of the single capture session
///
/// `Idle -> Starting -> Recording -> Finishing -> Idle`. A failure from
/// `Starting` or `Recording` lands back in `Idle` with a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionPhase {
    Idle,
    Starting,
    Recording,
    Finishing,
}

impl SessionPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionPhase::Idle)
    }
}

/// Terminal value of a session: exactly one per session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RecordingResult {
    Finished { file_path: PathBuf },
    Failed { error: CaptureError },
}

impl RecordingResult {
    pub fn is_finished(&self) -> bool {
        matches!(self, RecordingResult::Finished { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub result: RecordingResult,
    pub ended_at: DateTime<Utc>,
}

/// Point-in-time copy of the session state
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_recording: bool,
    pub session_id: Option<Uuid>,
    pub backend: Option<BackendId>,
    pub output_path: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<SessionOutcome>,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    session_id: Option<Uuid>,
    backend: Option<BackendId>,
    output_path: Option<PathBuf>,
    started_at: Option<DateTime<Utc>>,
    last_outcome: Option<SessionOutcome>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            session_id: None,
            backend: None,
            output_path: None,
            started_at: None,
            last_outcome: None,
        }
    }
}

/// Shared owner of the one-at-a-time session state
///
/// Every transition is keyed by session id, so a late callback from an
/// earlier session can never touch the current one.
#[derive(Debug, Clone, Default)]
pub struct SessionCell {
    inner: Arc<Mutex<SessionState>>,
}

impl SessionCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `Idle -> Starting`; `None` when a session is already active
    pub fn begin(&self) -> Option<Uuid> {
        let mut state = self.lock();
        if state.phase.is_active() {
            return None;
        }

        let id = Uuid::new_v4();
        state.phase = SessionPhase::Starting;
        state.session_id = Some(id);
        state.backend = None;
        state.output_path = None;
        state.started_at = None;
        Some(id)
    }

    /// Backend chosen, before the session is recording
    pub fn set_backend(&self, id: Uuid, backend: BackendId) -> bool {
        let mut state = self.lock();
        if state.session_id != Some(id) || state.phase != SessionPhase::Starting {
            return false;
        }
        state.backend = Some(backend);
        true
    }

    /// `Starting -> Recording`
    pub fn mark_recording(&self, id: Uuid, backend: BackendId, output_path: PathBuf) -> bool {
        let mut state = self.lock();
        if state.session_id != Some(id) || state.phase != SessionPhase::Starting {
            return false;
        }
        state.phase = SessionPhase::Recording;
        state.backend = Some(backend);
        state.output_path = Some(output_path);
        state.started_at = Some(Utc::now());
        true
    }

    /// `Recording -> Finishing` once a stop has been requested
    pub fn mark_finishing(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        if state.session_id != Some(id) || state.phase != SessionPhase::Recording {
            return false;
        }
        state.phase = SessionPhase::Finishing;
        true
    }

    /// Replace the output path once the final file name is known
    pub fn set_output_path(&self, id: Uuid, output_path: PathBuf) -> bool {
        let mut state = self.lock();
        if state.session_id != Some(id) || !state.phase.is_active() {
            return false;
        }
        state.output_path = Some(output_path);
        true
    }

    /// Record the terminal result and return to `Idle`
    ///
    /// Returns `true` only for the first call per session; the caller that
    /// gets `true` is the one that emits the terminal event.
    pub fn conclude(&self, id: Uuid, result: RecordingResult) -> bool {
        let mut state = self.lock();
        if state.session_id != Some(id) || !state.phase.is_active() {
            return false;
        }

        state.phase = SessionPhase::Idle;
        state.session_id = None;
        state.last_outcome = Some(SessionOutcome {
            session_id: id,
            result,
            ended_at: Utc::now(),
        });
        true
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock().phase
    }

    pub fn is_recording(&self) -> bool {
        self.lock().phase == SessionPhase::Recording
    }

    /// Id and backend of the active session, if any
    pub fn active(&self) -> Option<(Uuid, SessionPhase, Option<BackendId>)> {
        let state = self.lock();
        match (state.phase.is_active(), state.session_id) {
            (true, Some(id)) => Some((id, state.phase, state.backend)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            phase: state.phase,
            is_recording: state.phase == SessionPhase::Recording,
            session_id: state.session_id,
            backend: state.backend,
            output_path: state.output_path.clone(),
            started_at: state.started_at,
            last_outcome: state.last_outcome.clone(),
        }
    }
}
