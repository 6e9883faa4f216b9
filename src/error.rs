use serde::{Serialize, Serializer};
use std::path::PathBuf;

use crate::backend::BackendId;

/// Machine-readable category of a capture failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NoBackendAvailable,
    DeviceUnverified,
    SpawnFailure,
    DeviceBusyOrDisconnected,
    DeviceNotFound,
    NonZeroExitGeneric,
    OutputFileMissing,
    RemoteHostUnavailable,
    WriteFailure,
}

/// Classified failure of a capture session
///
/// Messages are written for the person holding the microphone; the raw
/// backend diagnostics are kept verbatim where no known pattern matched.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("No audio capture backend is available on this machine (tried: {})", format_backends(.tried))]
    NoBackendAvailable { tried: Vec<BackendId> },

    #[error("Input device '{device}' could not be verified")]
    DeviceUnverified { device: String },

    #[error("Failed to launch '{program}': {message}")]
    SpawnFailure { program: String, message: String },

    #[error("Microphone is in use by another application or was disconnected ({details})")]
    DeviceBusyOrDisconnected { details: String },

    #[error("No default recording device was found. Connect a microphone or select an input device ({details})")]
    DeviceNotFound { details: String },

    #[error("Recorder exited with {}: {stderr}", format_exit_code(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("Recorder finished but no audio file was created at {}", .path.display())]
    OutputFileMissing { path: PathBuf },

    #[error("Capture host is unavailable: {message}")]
    RemoteHostUnavailable { message: String },

    #[error("Failed to write recording to {}: {message}", .path.display())]
    WriteFailure { path: PathBuf, message: String },
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::NoBackendAvailable { .. } => ErrorKind::NoBackendAvailable,
            CaptureError::DeviceUnverified { .. } => ErrorKind::DeviceUnverified,
            CaptureError::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            CaptureError::DeviceBusyOrDisconnected { .. } => ErrorKind::DeviceBusyOrDisconnected,
            CaptureError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            CaptureError::NonZeroExit { .. } => ErrorKind::NonZeroExitGeneric,
            CaptureError::OutputFileMissing { .. } => ErrorKind::OutputFileMissing,
            CaptureError::RemoteHostUnavailable { .. } => ErrorKind::RemoteHostUnavailable,
            CaptureError::WriteFailure { .. } => ErrorKind::WriteFailure,
        }
    }

    pub fn remote_unavailable(message: impl Into<String>) -> Self {
        CaptureError::RemoteHostUnavailable {
            message: message.into(),
        }
    }
}

// Sent to HTTP clients and event subscribers as `{ kind, message }`
impl Serialize for CaptureError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("CaptureError", 2)?;
        state.serialize_field("kind", &self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

fn format_backends(backends: &[BackendId]) -> String {
    if backends.is_empty() {
        return "none".to_string();
    }
    backends
        .iter()
        .map(|b| b.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}
