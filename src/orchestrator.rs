use anyhow::{bail, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::backend::{output_extension, BackendCatalog, BackendId, BackendProber, CaptureFormat};
use crate::bridge::{CaptureBridge, MessageTransport, NatsTransport, NullTransport};
use crate::command::{CommandRunner, SystemRunner};
use crate::config::{BridgeConfig, CaptureConfig, Config};
use crate::device::{check_preference, is_legacy_device_label, DeviceDescriptor, DeviceResolver, PreferenceCheck, AUTO_DEVICE};
use crate::error::CaptureError;
use crate::platform::Platform;
use crate::preferences::{DevicePreference, JsonPreferenceStore, PreferenceStore};
use crate::session::{
    CaptureEvent, CaptureRequest, CaptureSession, LevelSettings, LocalCaptureSession,
    SessionContext, SessionSnapshot,
};

/// Tunables for a [`CaptureOrchestrator`]
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub format: CaptureFormat,
    pub output_dir: PathBuf,
    pub probe_timeout: Duration,
    pub device_probe_timeout: Duration,
    pub enumerate_timeout: Duration,
    pub levels: LevelSettings,
    pub stop_grace: Duration,
    pub finish_timeout: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default(), &BridgeConfig::default())
    }
}

impl OrchestratorOptions {
    pub fn from_config(capture: &CaptureConfig, bridge: &BridgeConfig) -> Self {
        Self {
            format: capture.format(),
            output_dir: capture.output_dir(),
            probe_timeout: capture.probe_timeout(),
            device_probe_timeout: capture.device_probe_timeout(),
            enumerate_timeout: capture.enumerate_timeout(),
            levels: capture.levels(),
            stop_grace: capture.stop_grace(),
            finish_timeout: bridge.finish_timeout(),
        }
    }
}

/// Entry point for callers: start/stop recordings and manage devices
///
/// `start` and `stop` return once the work is issued; the outcome of a
/// session arrives on [`CaptureOrchestrator::subscribe`].
pub struct CaptureOrchestrator {
    platform: Platform,
    ctx: SessionContext,
    prober: BackendProber,
    resolver: DeviceResolver,
    preferences: Arc<dyn PreferenceStore>,
    local: LocalCaptureSession,
    bridge: CaptureBridge,
    format: CaptureFormat,
    output_dir: PathBuf,
}

impl CaptureOrchestrator {
    pub fn new(
        catalog: BackendCatalog,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn MessageTransport>,
        preferences: Arc<dyn PreferenceStore>,
        options: OrchestratorOptions,
    ) -> Self {
        let ctx = SessionContext::new();
        let platform = catalog.platform();

        let prober = BackendProber::new(
            catalog.clone(),
            runner.clone(),
            transport.clone(),
            options.probe_timeout,
        );
        let resolver = DeviceResolver::new(
            catalog.clone(),
            runner,
            options.format,
            options.device_probe_timeout,
            options.enumerate_timeout,
        );
        let local = LocalCaptureSession::new(ctx.clone(), catalog, options.levels, options.stop_grace);
        let bridge = CaptureBridge::new(ctx.clone(), transport, options.finish_timeout);

        Self {
            platform,
            ctx,
            prober,
            resolver,
            preferences,
            local,
            bridge,
            format: options.format,
            output_dir: options.output_dir,
        }
    }

    /// Wire up the system runner, configured transport and JSON store
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let platform = Platform::current();
        let catalog = cfg.backends.catalog(platform);
        let transport = connect_transport(&cfg.bridge).await;
        let preferences = JsonPreferenceStore::new(cfg.preferences.path()?);
        info!("Device preference file: {}", preferences.path().display());

        Ok(Self::new(
            catalog,
            Arc::new(SystemRunner),
            transport,
            Arc::new(preferences),
            OrchestratorOptions::from_config(&cfg.capture, &cfg.bridge),
        ))
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Begin a recording; a no-op with a warning while one is active
    ///
    /// Returns whether this call began a session. A session that began
    /// may still fail; that arrives as its terminal event.
    pub async fn start(&self) -> bool {
        let Some(session_id) = self.ctx.cell.begin() else {
            warn!("start() called while a recording session is active, ignoring");
            return false;
        };
        info!("Starting recording session {}", session_id);

        let backend = match self.prober.detect().await {
            Ok(backend) => backend,
            Err(e) => {
                self.ctx.fail(session_id, e);
                return true;
            }
        };
        self.ctx.cell.set_backend(session_id, backend);

        let preference = self.effective_preference();
        let device = self
            .resolver
            .resolve_input_device(backend, preference.as_deref())
            .await;
        info!(
            "Input device for session {}: '{}' ({:?})",
            session_id, device.argument, device.source
        );
        if device.preference_rejected {
            self.reset_preference("it failed live verification");
        }

        let output_path = match self.output_path(backend) {
            Ok(path) => path,
            Err(e) => {
                self.ctx.fail(session_id, e);
                return true;
            }
        };

        let request = CaptureRequest {
            session_id,
            backend,
            device: device.argument,
            output_path,
            format: self.format,
        };

        if backend.is_local() {
            self.local.start(request).await;
        } else {
            self.bridge.start(request).await;
        }
        true
    }

    /// Ask the active backend to finish; the terminal event follows
    pub async fn stop(&self) {
        match self.ctx.cell.active() {
            None => warn!("stop() called while idle, ignoring"),
            Some((_, _, Some(backend))) if backend.is_local() => self.local.stop().await,
            Some((_, _, Some(_))) => self.bridge.stop().await,
            Some((session_id, phase, None)) => {
                warn!(
                    "stop() called while session {} is {:?} without a backend, ignoring",
                    session_id, phase
                );
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.ctx.events.subscribe()
    }

    pub fn status(&self) -> SessionSnapshot {
        self.ctx.cell.snapshot()
    }

    pub fn is_recording(&self) -> bool {
        self.ctx.cell.is_recording()
    }

    /// Persist a device id for this platform (`"auto"` or empty clears it)
    pub fn set_preferred_device(&self, device: &str) -> Result<()> {
        let device = device.trim();
        let device = if device.is_empty() { AUTO_DEVICE } else { device };
        if is_legacy_device_label(device) {
            bail!("'{}' is a device label, not a device id", device);
        }

        info!("Setting preferred input device to '{}'", device);
        self.preferences
            .save(&DevicePreference::new(device, self.platform))
    }

    /// Stored device id for this platform; `None` means automatic
    pub fn get_preferred_device(&self) -> Option<String> {
        let stored = self.load_preference()?;
        match check_preference(stored.device_for(self.platform)) {
            PreferenceCheck::Device(device) => Some(device),
            PreferenceCheck::Auto | PreferenceCheck::Legacy(_) => None,
        }
    }

    pub async fn list_available_devices(&self) -> Vec<DeviceDescriptor> {
        self.resolver.list_devices().await
    }

    /// Whether any backend is usable (probes on first call)
    pub async fn is_available(&self) -> bool {
        self.prober.detect().await.is_ok()
    }

    pub async fn current_backend(&self) -> Result<BackendId, CaptureError> {
        self.prober.detect().await
    }

    /// Forget the detected backend and probe again
    pub async fn reinitialize(&self) -> Result<BackendId, CaptureError> {
        self.prober.reinitialize().await
    }

    fn load_preference(&self) -> Option<DevicePreference> {
        match self.preferences.load() {
            Ok(preference) => preference,
            Err(e) => {
                warn!("Failed to load device preference: {:#}", e);
                None
            }
        }
    }

    /// Preference usable for this session, discarding legacy labels
    fn effective_preference(&self) -> Option<String> {
        let stored = self.load_preference()?;
        let Some(device) = stored.device_for(self.platform) else {
            debug!(
                "Ignoring device preference recorded on {}",
                stored.platform
            );
            return None;
        };

        match check_preference(Some(device)) {
            PreferenceCheck::Auto => None,
            PreferenceCheck::Device(device) => Some(device),
            PreferenceCheck::Legacy(label) => {
                warn!("Discarding legacy device label '{}'", label);
                self.reset_preference("it is a legacy device label");
                None
            }
        }
    }

    fn reset_preference(&self, reason: &str) {
        info!("Resetting device preference to '{}' because {}", AUTO_DEVICE, reason);
        if let Err(e) = self.preferences.save(&DevicePreference::auto(self.platform)) {
            warn!("Failed to persist corrected device preference: {:#}", e);
        }
    }

    fn output_path(&self, backend: BackendId) -> Result<PathBuf, CaptureError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| CaptureError::WriteFailure {
            path: self.output_dir.clone(),
            message: e.to_string(),
        })?;

        Ok(self.output_dir.join(format!(
            "recording-{}.{}",
            Utc::now().timestamp_millis(),
            output_extension(backend)
        )))
    }
}

async fn connect_transport(cfg: &BridgeConfig) -> Arc<dyn MessageTransport> {
    if cfg.nats_url.trim().is_empty() {
        return Arc::new(NullTransport);
    }

    match NatsTransport::connect(&cfg.nats_url, &cfg.subject_prefix, &cfg.host_id).await {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            warn!("Capture host transport unavailable: {:#}", e);
            Arc::new(NullTransport)
        }
    }
}
