// Integration tests for the local recording supervisor
//
// Small /bin/sh scripts stand in for the recorder; probing and device
// verification go through a scripted runner that accepts the script.
#![cfg(unix)]

mod common;

use anyhow::Result;
use common::{drain, next_started, next_terminal, orchestrator, write_script, FakeRunner};
use loqa_capture::{
    BackendCatalog, BackendId, CaptureEvent, CaptureOrchestrator, ErrorKind, MemoryPreferenceStore,
    NullTransport, Platform, SessionPhase,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

// Writes a file on SIGINT, like arecord finalizing its WAV header
const RECORD_UNTIL_INTERRUPTED: &str = r#"trap 'printf RIFF > "$out"; exit 0' INT
while :; do sleep 1 >/dev/null 2>&1 & wait $!; done"#;

fn recorder(dir: &Path, body: &str) -> (CaptureOrchestrator, Arc<FakeRunner>, PathBuf) {
    let script = write_script(dir, "recorder.sh", body);
    let program = script.to_string_lossy().into_owned();

    let runner = FakeRunner::new();
    runner.ok(&program, "");

    let catalog = BackendCatalog::new(Platform::Linux)
        .with_order(vec![BackendId::NativeCapture])
        .with_program(BackendId::NativeCapture, program);

    let out_dir = dir.join("recordings");
    let orchestrator = orchestrator(
        catalog,
        runner.clone(),
        Arc::new(NullTransport),
        Arc::new(MemoryPreferenceStore::default()),
        &out_dir,
    );
    (orchestrator, runner, out_dir)
}

fn error_kind(event: &CaptureEvent) -> Option<ErrorKind> {
    match event {
        CaptureEvent::Error { error, .. } => Some(error.kind()),
        _ => None,
    }
}

#[tokio::test]
async fn test_stop_finalizes_recording() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, out_dir) = recorder(dir.path(), RECORD_UNTIL_INTERRUPTED);
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let started = next_started(&mut events).await;
    let CaptureEvent::Started { backend, output_path, .. } = started else {
        unreachable!()
    };
    assert_eq!(backend, BackendId::NativeCapture);
    assert!(output_path.starts_with(&out_dir));
    assert!(output_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("recording-"));
    assert_eq!(output_path.extension().unwrap(), "wav");
    assert!(orchestrator.is_recording());

    // Synthetic level data flows while recording
    let data = common::next_matching(&mut events, |e| matches!(e, CaptureEvent::AudioData { .. })).await;
    if let CaptureEvent::AudioData { bytes, .. } = data {
        assert_eq!(bytes.len(), 128);
    }

    orchestrator.stop().await;
    assert!(matches!(
        orchestrator.status().phase,
        SessionPhase::Finishing | SessionPhase::Idle
    ));

    match next_terminal(&mut events).await {
        CaptureEvent::Finished { file_path, .. } => {
            assert_eq!(file_path, output_path);
            assert_eq!(std::fs::read(&file_path)?, b"RIFF");
        }
        other => panic!("expected finished, got {:?}", other),
    }

    let status = orchestrator.status();
    assert_eq!(status.phase, SessionPhase::Idle);
    assert!(status.last_outcome.unwrap().result.is_finished());

    // Nothing after the terminal event
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(drain(&mut events).iter().all(|e| !e.is_terminal()));

    Ok(())
}

#[tokio::test]
async fn test_clean_exit_with_file_finishes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(dir.path(), r#"printf RIFF > "$out"; exit 0"#);
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let event = next_terminal(&mut events).await;
    assert!(matches!(event, CaptureEvent::Finished { .. }), "{:?}", event);

    Ok(())
}

#[tokio::test]
async fn test_clean_exit_without_file_is_output_missing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(dir.path(), "exit 0");
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let event = next_terminal(&mut events).await;
    assert_eq!(error_kind(&event), Some(ErrorKind::OutputFileMissing));
    assert_eq!(orchestrator.status().phase, SessionPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_device_not_found_stderr_is_classified() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(
        dir.path(),
        r#"echo "arecord: main:850: audio open error: Device Not Found" >&2; exit 1"#,
    );
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let event = next_terminal(&mut events).await;
    assert_eq!(error_kind(&event), Some(ErrorKind::DeviceNotFound));
    if let CaptureEvent::Error { error, .. } = event {
        assert!(error.to_string().contains("No default recording device"));
    }

    Ok(())
}

#[tokio::test]
async fn test_io_error_stderr_means_device_busy() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(
        dir.path(),
        r#"echo "arecord: pcm_read:2221: read error: Input/output error" >&2; exit 1"#,
    );
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let event = next_terminal(&mut events).await;
    assert_eq!(error_kind(&event), Some(ErrorKind::DeviceBusyOrDisconnected));

    Ok(())
}

#[tokio::test]
async fn test_unknown_failure_keeps_stderr_verbatim() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(dir.path(), r#"echo "sample format not available" >&2; exit 3"#);
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    match next_terminal(&mut events).await {
        CaptureEvent::Error { error, .. } => {
            assert_eq!(error.kind(), ErrorKind::NonZeroExitGeneric);
            assert!(error.to_string().contains("sample format not available"));
            assert!(error.to_string().contains("code 3"));
        }
        other => panic!("expected error, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_spawn_failure_returns_to_idle() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("not-installed");
    let program = missing.to_string_lossy().into_owned();

    let runner = FakeRunner::new();
    runner.ok(&program, "");
    let catalog = BackendCatalog::new(Platform::Linux)
        .with_order(vec![BackendId::NativeCapture])
        .with_program(BackendId::NativeCapture, program);
    let orchestrator = orchestrator(
        catalog,
        runner,
        Arc::new(NullTransport),
        Arc::new(MemoryPreferenceStore::default()),
        dir.path(),
    );
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    let events_seen = drain(&mut events);
    assert_eq!(events_seen.len(), 1, "{:?}", events_seen);
    assert_eq!(error_kind(&events_seen[0]), Some(ErrorKind::SpawnFailure));
    assert_eq!(orchestrator.status().phase, SessionPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_start_while_recording_is_ignored() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let spawn_log = dir.path().join("spawned");
    let body = format!(
        "echo spawned >> '{}'\n{}",
        spawn_log.display(),
        RECORD_UNTIL_INTERRUPTED
    );
    let (orchestrator, _runner, _) = recorder(dir.path(), &body);
    let mut events = orchestrator.subscribe();

    assert!(orchestrator.start().await);
    next_started(&mut events).await;
    let before = orchestrator.status();

    assert!(!orchestrator.start().await);
    assert!(!orchestrator.start().await);

    let after = orchestrator.status();
    assert_eq!(after.session_id, before.session_id);
    assert_eq!(after.phase, SessionPhase::Recording);

    orchestrator.stop().await;
    next_terminal(&mut events).await;

    let spawned = std::fs::read_to_string(&spawn_log)?;
    assert_eq!(spawned.lines().count(), 1);

    Ok(())
}

#[tokio::test]
async fn test_stop_while_idle_is_a_noop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(dir.path(), RECORD_UNTIL_INTERRUPTED);
    let mut events = orchestrator.subscribe();

    orchestrator.stop().await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(drain(&mut events).is_empty());
    assert_eq!(orchestrator.status().phase, SessionPhase::Idle);
    assert!(orchestrator.status().last_outcome.is_none());

    Ok(())
}

#[tokio::test]
async fn test_backend_ignoring_stop_is_killed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(
        dir.path(),
        r#"trap '' INT
while :; do sleep 1 >/dev/null 2>&1 & wait $!; done"#,
    );
    let mut events = orchestrator.subscribe();

    orchestrator.start().await;
    next_started(&mut events).await;
    orchestrator.stop().await;

    // Killed after the 500ms grace period, never wrote a file
    let event = next_terminal(&mut events).await;
    assert_eq!(error_kind(&event), Some(ErrorKind::NonZeroExitGeneric));
    assert_eq!(orchestrator.status().phase, SessionPhase::Idle);

    Ok(())
}

#[tokio::test]
async fn test_sessions_run_back_to_back() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let (orchestrator, _runner, _) = recorder(dir.path(), RECORD_UNTIL_INTERRUPTED);
    let mut events = orchestrator.subscribe();

    let mut files = Vec::new();
    for _ in 0..2 {
        orchestrator.start().await;
        next_started(&mut events).await;
        orchestrator.stop().await;
        match next_terminal(&mut events).await {
            CaptureEvent::Finished { file_path, .. } => files.push(file_path),
            other => panic!("expected finished, got {:?}", other),
        }
        // Distinct millisecond timestamps
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_ne!(files[0], files[1]);
    Ok(())
}
