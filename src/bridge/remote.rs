use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::{decode, BridgeCommand, BridgeEvent, ContainerFormat};
use super::transport::MessageTransport;
use crate::audio::write_pcm16_wav;
use crate::backend::{BackendId, CaptureFormat};
use crate::error::CaptureError;
use crate::session::{
    classify_diagnostics, CaptureEvent, CaptureRequest, CaptureSession, RecordingResult,
    SessionContext, SessionPhase, SessionSnapshot,
};

struct Listener {
    session_id: Uuid,
    task: JoinHandle<()>,
}

struct BridgeInner {
    ctx: SessionContext,
    transport: Arc<dyn MessageTransport>,
    finish_timeout: Duration,
    listener: Mutex<Option<Listener>>,
}

impl BridgeInner {
    /// Drop the session's listener; `true` only for the first caller
    fn detach(&self, session_id: Uuid, abort: bool) -> bool {
        let mut slot = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        match slot.as_ref() {
            Some(listener) if listener.session_id == session_id => {}
            _ => return false,
        }
        let Some(listener) = slot.take() else {
            return false;
        };
        if abort {
            listener.task.abort();
        }
        debug!("Detached capture host listener for session {}", session_id);
        true
    }

    /// Conclude locally when the host cannot finish the session itself
    fn abandon(&self, session_id: Uuid, message: impl Into<String>) {
        self.detach(session_id, true);
        self.ctx
            .fail(session_id, CaptureError::remote_unavailable(message));
    }
}

/// Capture delegated to a separate process over a [`MessageTransport`]
///
/// Mirrors the local supervisor: `start` sends the command and returns,
/// the terminal event arrives from the host's `finished` or `error`.
#[derive(Clone)]
pub struct CaptureBridge {
    inner: Arc<BridgeInner>,
}

impl CaptureBridge {
    pub fn new(
        ctx: SessionContext,
        transport: Arc<dyn MessageTransport>,
        finish_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                ctx,
                transport,
                finish_timeout,
                listener: Mutex::new(None),
            }),
        }
    }

    pub async fn is_host_available(&self) -> bool {
        self.inner.transport.is_available().await
    }

    /// Whether a listener is currently attached
    pub fn is_listening(&self) -> bool {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

#[async_trait]
impl CaptureSession for CaptureBridge {
    async fn start(&self, request: CaptureRequest) {
        let inner = &self.inner;
        let session_id = request.session_id;

        if !inner.transport.is_available().await {
            inner.ctx.fail(
                session_id,
                CaptureError::remote_unavailable("no capture host is connected"),
            );
            return;
        }

        let events = match inner.transport.subscribe().await {
            Ok(events) => events,
            Err(e) => {
                inner.ctx.fail(
                    session_id,
                    CaptureError::remote_unavailable(format!("{:#}", e)),
                );
                return;
            }
        };

        {
            let mut slot = inner.listener.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(stale) = slot.take() {
                warn!("Replacing stale listener for session {}", stale.session_id);
                stale.task.abort();
            }
            let task = tokio::spawn(listen(Arc::clone(inner), request.clone(), events));
            *slot = Some(Listener { session_id, task });
        }

        let command = BridgeCommand::StartCapture {
            session_id,
            device: request.device.clone(),
            sample_rate: request.format.sample_rate,
            channels: request.format.channels,
        };
        info!(
            "Sending start-capture to capture host (session={}, device={})",
            session_id, request.device
        );
        if let Err(e) = inner.transport.send(command).await {
            inner.abandon(session_id, format!("start command failed: {:#}", e));
        }
    }

    async fn stop(&self) {
        let inner = &self.inner;
        let Some((session_id, phase, _)) = inner.ctx.cell.active() else {
            warn!("stop() called while not recording, ignoring");
            return;
        };

        match phase {
            SessionPhase::Recording => {
                inner.ctx.cell.mark_finishing(session_id);
            }
            // The host may still be acquiring the microphone
            SessionPhase::Starting => {}
            SessionPhase::Finishing | SessionPhase::Idle => {
                warn!("stop() called while session {} is {:?}, ignoring", session_id, phase);
                return;
            }
        }

        if !inner.transport.is_available().await {
            warn!("Capture host unavailable at stop, cleaning up locally");
            inner.abandon(session_id, "capture host went away before finishing the recording");
            return;
        }

        info!("Sending stop-capture to capture host (session={})", session_id);
        if let Err(e) = inner
            .transport
            .send(BridgeCommand::StopCapture { session_id })
            .await
        {
            inner.abandon(session_id, format!("stop command failed: {:#}", e));
            return;
        }

        let watchdog = Arc::clone(inner);
        tokio::spawn(async move {
            tokio::time::sleep(watchdog.finish_timeout).await;
            if watchdog.detach(session_id, true) {
                warn!(
                    "Capture host did not finalize session {} within {:?}",
                    session_id, watchdog.finish_timeout
                );
                watchdog.ctx.fail(
                    session_id,
                    CaptureError::remote_unavailable("capture host did not finalize the recording"),
                );
            }
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        self.inner.ctx.cell.snapshot()
    }

    fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.inner.ctx.events.subscribe()
    }
}

async fn listen(inner: Arc<BridgeInner>, request: CaptureRequest, mut events: mpsc::Receiver<BridgeEvent>) {
    let session_id = request.session_id;
    let mut started = false;

    while let Some(event) = events.recv().await {
        if event.session_id() != session_id {
            debug!("Ignoring capture host event for session {}", event.session_id());
            continue;
        }

        match event {
            BridgeEvent::Started { .. } => {
                if started {
                    continue;
                }
                started = true;
                info!("Capture host started session {}", session_id);
                if inner.ctx.cell.mark_recording(
                    session_id,
                    BackendId::BrowserEmbedded,
                    request.output_path.clone(),
                ) {
                    inner.ctx.started(
                        session_id,
                        BackendId::BrowserEmbedded,
                        request.output_path.clone(),
                    );
                }
            }
            BridgeEvent::Data { chunk, .. } => match decode(&chunk) {
                Ok(bytes) => inner.ctx.audio_data(session_id, bytes),
                Err(e) => warn!("Dropping audio chunk for session {}: {:#}", session_id, e),
            },
            BridgeEvent::Finished { format, payload, .. } => {
                info!("Capture host finished session {} ({:?})", session_id, format);
                // The host picks the container, so the extension is only
                // settled here
                let path = request.output_path.with_extension(format.extension());
                inner.ctx.cell.set_output_path(session_id, path.clone());
                let result = match decode(&payload) {
                    Ok(bytes) => write_recording(&path, format, bytes, request.format).await,
                    Err(e) => RecordingResult::Failed {
                        error: CaptureError::WriteFailure {
                            path,
                            message: format!("{:#}", e),
                        },
                    },
                };
                inner.detach(session_id, false);
                inner.ctx.finish(session_id, result);
                return;
            }
            BridgeEvent::Error { message, .. } => {
                warn!("Capture host reported an error for session {}: {}", session_id, message);
                let error = classify_diagnostics(&message)
                    .unwrap_or_else(|| CaptureError::remote_unavailable(message));
                inner.detach(session_id, false);
                inner.ctx.fail(session_id, error);
                return;
            }
        }
    }

    if inner.detach(session_id, false) {
        inner.ctx.fail(
            session_id,
            CaptureError::remote_unavailable("capture host closed the event stream"),
        );
    }
}

/// Single writer of the session's output file
async fn write_recording(
    path: &Path,
    format: ContainerFormat,
    bytes: Vec<u8>,
    capture: CaptureFormat,
) -> RecordingResult {
    let target: PathBuf = path.to_path_buf();
    let written = match format {
        ContainerFormat::Pcm16 => {
            let target = target.clone();
            tokio::task::spawn_blocking(move || {
                write_pcm16_wav(&target, &bytes, capture.sample_rate, capture.channels)
            })
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result)
        }
        _ => tokio::fs::write(&target, &bytes)
            .await
            .map_err(anyhow::Error::from),
    };

    match written {
        Ok(()) => RecordingResult::Finished { file_path: target },
        Err(e) => RecordingResult::Failed {
            error: CaptureError::WriteFailure {
                path: target,
                message: format!("{:#}", e),
            },
        },
    }
}
