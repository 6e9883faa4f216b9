// Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use loqa_capture::command::{CommandOutput, CommandRunner, RunError};
use loqa_capture::session::{CaptureEvent, LevelSettings};
use loqa_capture::{
    BackendCatalog, CaptureOrchestrator, MessageTransport, OrchestratorOptions, PreferenceStore,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

#[derive(Clone)]
enum Reply {
    Ok(String),
    Fail(String),
}

struct Rule {
    program: String,
    arg: Option<String>,
    reply: Reply,
}

/// Scripted [`CommandRunner`]: the most recently added matching rule wins,
/// unmatched programs behave as if not installed
#[derive(Default)]
pub struct FakeRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn add(&self, program: &str, arg: Option<&str>, reply: Reply) {
        self.rules.lock().unwrap().push(Rule {
            program: program.to_string(),
            arg: arg.map(str::to_string),
            reply,
        });
    }

    /// `program` succeeds with `stdout` for any arguments
    pub fn ok(&self, program: &str, stdout: &str) {
        self.add(program, None, Reply::Ok(stdout.to_string()));
    }

    /// `program` fails for any arguments
    pub fn fail(&self, program: &str) {
        self.add(program, None, Reply::Fail(String::new()));
    }

    /// `program` succeeds when one of its arguments equals `arg`
    pub fn ok_when(&self, program: &str, arg: &str, stdout: &str) {
        self.add(program, Some(arg), Reply::Ok(stdout.to_string()));
    }

    /// `program` fails with `stderr` when one of its arguments equals `arg`
    pub fn fail_when(&self, program: &str, arg: &str, stderr: &str) {
        self.add(program, Some(arg), Reply::Fail(stderr.to_string()));
    }

    /// Every invocation so far as `program arg1 arg2 ...`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called_with(&self, program: &str, arg: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| call.starts_with(program) && call.split(' ').any(|a| a == arg))
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        _timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));

        let reply = self
            .rules
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|rule| {
                rule.program == program
                    && rule.arg.as_ref().map_or(true, |arg| args.contains(arg))
            })
            .map(|rule| rule.reply.clone());

        match reply {
            Some(Reply::Ok(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(Reply::Fail(stderr)) => Err(RunError::NonZeroExit {
                program: program.to_string(),
                code: Some(1),
                stdout: String::new(),
                stderr,
            }),
            None => Err(RunError::Spawn {
                program: program.to_string(),
                message: "No such file or directory".to_string(),
            }),
        }
    }
}

pub fn test_options(output_dir: &Path) -> OrchestratorOptions {
    OrchestratorOptions {
        output_dir: output_dir.to_path_buf(),
        probe_timeout: Duration::from_secs(1),
        device_probe_timeout: Duration::from_secs(1),
        enumerate_timeout: Duration::from_secs(1),
        levels: LevelSettings {
            interval: Duration::from_millis(20),
            buffer_len: 64,
            sample_rate: 16000,
        },
        stop_grace: Duration::from_millis(500),
        finish_timeout: Duration::from_millis(500),
        ..OrchestratorOptions::default()
    }
}

pub fn orchestrator(
    catalog: BackendCatalog,
    runner: Arc<FakeRunner>,
    transport: Arc<dyn MessageTransport>,
    preferences: Arc<dyn PreferenceStore>,
    output_dir: &Path,
) -> CaptureOrchestrator {
    CaptureOrchestrator::new(catalog, runner, transport, preferences, test_options(output_dir))
}

/// Next event matching `pred`, failing the test after 10s
pub async fn next_matching<F>(rx: &mut broadcast::Receiver<CaptureEvent>, pred: F) -> CaptureEvent
where
    F: Fn(&CaptureEvent) -> bool,
{
    let wait = async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event bus closed"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for capture event")
}

pub async fn next_terminal(rx: &mut broadcast::Receiver<CaptureEvent>) -> CaptureEvent {
    next_matching(rx, CaptureEvent::is_terminal).await
}

pub async fn next_started(rx: &mut broadcast::Receiver<CaptureEvent>) -> CaptureEvent {
    next_matching(rx, |e| matches!(e, CaptureEvent::Started { .. })).await
}

/// Events already queued, without waiting
pub fn drain(rx: &mut broadcast::Receiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => return events,
        }
    }
}

/// Executable `/bin/sh` script standing in for a recorder
///
/// Recorders receive the output path as their last argument, available to
/// the body as `$out`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    let script = format!("#!/bin/sh\nfor out; do :; done\n{}\n", body);
    std::fs::write(&path, script).unwrap();

    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}
