use async_trait::async_trait;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::capture::{CaptureRequest, CaptureSession};
use super::classify::{classify_diagnostics, exit_result};
use super::events::{CaptureEvent, SessionContext};
use super::levels::{spawn_level_task, LevelSettings};
use super::state::{RecordingResult, SessionSnapshot};
use crate::backend::{build_invocation, BackendCatalog, BackendId, StopStrategy};
use crate::error::CaptureError;

// Upper bound on draining stderr after exit; orphaned grandchildren can
// hold the pipe open
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

struct ActiveProcess {
    session_id: Uuid,
    stop_tx: oneshot::Sender<()>,
}

/// Runs local backends as child processes
///
/// The monitor task that owns the child is the only place a local session
/// concludes; `stop` merely asks the backend to finalize.
pub struct LocalCaptureSession {
    ctx: SessionContext,
    catalog: BackendCatalog,
    levels: LevelSettings,
    stop_grace: Duration,
    active: Mutex<Option<ActiveProcess>>,
}

impl LocalCaptureSession {
    pub fn new(
        ctx: SessionContext,
        catalog: BackendCatalog,
        levels: LevelSettings,
        stop_grace: Duration,
    ) -> Self {
        Self {
            ctx,
            catalog,
            levels,
            stop_grace,
            active: Mutex::new(None),
        }
    }

    /// Register the stop channel, then move the session to `Recording`
    ///
    /// Any `stop` that observes `Recording` finds the sender in place.
    fn arm(&self, session_id: Uuid, backend: BackendId, output_path: PathBuf) -> Option<oneshot::Receiver<()>> {
        let (stop_tx, stop_rx) = oneshot::channel();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = Some(ActiveProcess {
            session_id,
            stop_tx,
        });

        if self.ctx.cell.mark_recording(session_id, backend, output_path) {
            Some(stop_rx)
        } else {
            *active = None;
            None
        }
    }

    fn spawn_failure(&self, session_id: Uuid, program: &str, message: impl Into<String>) {
        self.ctx.fail(
            session_id,
            CaptureError::SpawnFailure {
                program: program.to_string(),
                message: message.into(),
            },
        );
    }
}

#[async_trait]
impl CaptureSession for LocalCaptureSession {
    async fn start(&self, request: CaptureRequest) {
        let session_id = request.session_id;
        let backend = request.backend;

        let Some(program) = self.catalog.program(backend) else {
            self.spawn_failure(session_id, backend.as_str(), "backend does not run as a local process");
            return;
        };
        let Some(invocation) = build_invocation(
            backend,
            self.catalog.platform(),
            &program,
            &request.device,
            &request.output_path,
            request.format,
        ) else {
            self.spawn_failure(session_id, &program, "no invocation for this backend");
            return;
        };

        info!(
            "Spawning {} backend: {} {:?}",
            backend, invocation.program, invocation.args
        );

        let mut child = match Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                self.spawn_failure(session_id, &invocation.program, e.to_string());
                return;
            }
        };

        let Some(stop_rx) = self.arm(session_id, backend, request.output_path.clone()) else {
            warn!("Session {} ended before its backend started, killing it", session_id);
            let _ = child.kill().await;
            return;
        };
        self.ctx.started(session_id, backend, request.output_path.clone());

        let stderr_task = collect_stderr(&mut child, invocation.program.clone());
        let level_task = spawn_level_task(self.ctx.clone(), session_id, self.levels);

        let monitor = ProcessMonitor {
            ctx: self.ctx.clone(),
            session_id,
            output_path: request.output_path,
            strategy: invocation.stop,
            stop_grace: self.stop_grace,
        };
        tokio::spawn(monitor.run(child, stop_rx, stderr_task, level_task));
    }

    async fn stop(&self) {
        let Some((session_id, _, _)) = self.ctx.cell.active() else {
            warn!("stop() called while not recording, ignoring");
            return;
        };
        if !self.ctx.cell.mark_finishing(session_id) {
            warn!("stop() called while session {} is not recording, ignoring", session_id);
            return;
        }

        let active = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        match active {
            Some(process) if process.session_id == session_id => {
                info!("Stopping recording session {}", session_id);
                if process.stop_tx.send(()).is_err() {
                    debug!("Backend for session {} already exited", session_id);
                }
            }
            _ => warn!("No running backend for session {}", session_id),
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.ctx.cell.snapshot()
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.ctx.events.subscribe()
    }
}

/// Owns one backend child from spawn to conclusion
struct ProcessMonitor {
    ctx: SessionContext,
    session_id: Uuid,
    output_path: PathBuf,
    strategy: StopStrategy,
    stop_grace: Duration,
}

impl ProcessMonitor {
    async fn run(
        self,
        mut child: Child,
        mut stop_rx: oneshot::Receiver<()>,
        stderr_task: JoinHandle<String>,
        level_task: JoinHandle<()>,
    ) {
        let mut stop_requested = false;
        let status = tokio::select! {
            status = child.wait() => status,
            Ok(()) = &mut stop_rx => {
                stop_requested = true;
                self.stop_child(&mut child).await
            }
        };

        level_task.abort();

        let stderr = match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, stderr_task).await {
            Ok(Ok(text)) => text,
            _ => String::new(),
        };

        let result = match status {
            Ok(status) => {
                info!(
                    "Backend for session {} exited with {}",
                    self.session_id, status
                );
                self.exit_outcome(status, stop_requested, &stderr)
            }
            Err(e) => RecordingResult::Failed {
                error: CaptureError::SpawnFailure {
                    program: "backend".to_string(),
                    message: format!("lost track of backend process: {}", e),
                },
            },
        };

        self.ctx.finish(self.session_id, result);
    }

    fn exit_outcome(&self, status: ExitStatus, stop_requested: bool, stderr: &str) -> RecordingResult {
        // Recorders that exit non-zero on our own interrupt still wrote a
        // valid file; only treat that as failure when stderr says so
        let success = status.success()
            || (stop_requested
                && self.output_path.is_file()
                && classify_diagnostics(stderr).is_none());
        exit_result(success, status.code(), stderr, &self.output_path)
    }

    async fn stop_child(&self, child: &mut Child) -> std::io::Result<ExitStatus> {
        request_graceful_stop(child, &self.strategy).await;

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    "Backend for session {} ignored stop for {:?}, killing it",
                    self.session_id, self.stop_grace
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill backend: {}", e);
                }
                child.wait().await
            }
        }
    }
}

async fn request_graceful_stop(child: &mut Child, strategy: &StopStrategy) {
    match strategy {
        StopStrategy::Interrupt => interrupt(child),
        StopStrategy::StdinLine(line) => {
            let Some(mut stdin) = child.stdin.take() else {
                warn!("Backend stdin unavailable, killing instead");
                let _ = child.start_kill();
                return;
            };
            let line = format!("{}\n", line);
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                warn!("Failed to send stop line to backend: {}", e);
            }
            let _ = stdin.flush().await;
            // Closing stdin is an end-of-input signal too
            drop(stdin);
        }
    }
}

#[cfg(unix)]
fn interrupt(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGINT) {
        warn!("Failed to interrupt backend {}: {}, killing instead", pid, e);
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    // No console interrupt for a detached child here; the recorders
    // finalize their headers on termination
    let _ = child.start_kill();
}

/// Keep the whole of stderr for classification, logging each line
fn collect_stderr(child: &mut Child, program: String) -> JoinHandle<String> {
    let stderr = child.stderr.take();
    tokio::spawn(async move {
        let mut collected = String::new();
        let Some(stderr) = stderr else {
            return collected;
        };

        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!("[{}] {}", program, line);
            collected.push_str(&line);
            collected.push('\n');
        }
        collected
    })
}
