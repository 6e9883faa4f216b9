use std::path::Path;

use super::state::RecordingResult;
use crate::error::CaptureError;

const BUSY_PATTERNS: &[&str] = &[
    "i/o error",
    "input/output error",
    "device or resource busy",
];

const NOT_FOUND_PATTERNS: &[&str] = &[
    "device not found",
    "could not find audio only device",
    "no such audio device",
    "no such device",
];

/// Known failure in backend diagnostics, if any pattern matches
pub fn classify_diagnostics(text: &str) -> Option<CaptureError> {
    let lower = text.to_lowercase();
    let details = summarize(text);

    if BUSY_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(CaptureError::DeviceBusyOrDisconnected { details });
    }
    if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
        return Some(CaptureError::DeviceNotFound { details });
    }
    None
}

/// Failure for a backend that exited unsuccessfully
pub fn classify_exit(code: Option<i32>, stderr: &str) -> CaptureError {
    classify_diagnostics(stderr).unwrap_or_else(|| CaptureError::NonZeroExit {
        code,
        stderr: stderr.trim().to_string(),
    })
}

/// Terminal result of a backend process from its exit status and output
pub fn exit_result(success: bool, code: Option<i32>, stderr: &str, output: &Path) -> RecordingResult {
    if !success {
        return RecordingResult::Failed {
            error: classify_exit(code, stderr),
        };
    }

    if output.is_file() {
        RecordingResult::Finished {
            file_path: output.to_path_buf(),
        }
    } else {
        RecordingResult::Failed {
            error: CaptureError::OutputFileMissing {
                path: output.to_path_buf(),
            },
        }
    }
}

// Last non-empty line is what the backends put their reason on
fn summarize(text: &str) -> String {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default()
        .to_string()
}
