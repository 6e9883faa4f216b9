//! Recording session lifecycle
//!
//! This module provides the pieces shared by every capture path:
//! - `SessionCell`: the one-at-a-time state machine
//! - `SessionContext` / `CaptureEvent`: terminal-once event delivery
//! - exit classification for backend processes
//! - synthetic level data for meters
//! - `LocalCaptureSession`: the subprocess supervisor

mod capture;
mod classify;
mod events;
mod levels;
mod state;
mod supervisor;

pub use capture::{CaptureRequest, CaptureSession};
pub use classify::{classify_diagnostics, classify_exit, exit_result};
pub use events::{CaptureEvent, EventBus, SessionContext};
pub use levels::{spawn_level_task, LevelSettings, SyntheticLevels};
pub use state::{RecordingResult, SessionCell, SessionOutcome, SessionPhase, SessionSnapshot};
pub use supervisor::LocalCaptureSession;
