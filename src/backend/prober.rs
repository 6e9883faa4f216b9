use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::descriptor::{BackendCatalog, BackendId, CapabilityTest};
use crate::bridge::MessageTransport;
use crate::command::CommandRunner;
use crate::error::CaptureError;

/// Finds the first usable capture backend and remembers it
///
/// Detection runs once per process; [`BackendProber::reinitialize`] is the
/// only way to forget the result.
pub struct BackendProber {
    catalog: BackendCatalog,
    runner: Arc<dyn CommandRunner>,
    transport: Arc<dyn MessageTransport>,
    timeout: Duration,
    detected: Mutex<Option<BackendId>>,
}

impl BackendProber {
    pub fn new(
        catalog: BackendCatalog,
        runner: Arc<dyn CommandRunner>,
        transport: Arc<dyn MessageTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            runner,
            transport,
            timeout,
            detected: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> &BackendCatalog {
        &self.catalog
    }

    /// Backend selected by an earlier detection, if any
    pub async fn current(&self) -> Option<BackendId> {
        *self.detected.lock().await
    }

    /// Cached backend, detecting it from the catalog order on first use
    pub async fn detect(&self) -> Result<BackendId, CaptureError> {
        let mut detected = self.detected.lock().await;
        if let Some(id) = *detected {
            return Ok(id);
        }

        let id = self.probe_in_order(&self.catalog.candidates()).await?;
        *detected = Some(id);
        Ok(id)
    }

    /// Detect from an explicit candidate list, replacing the cached result
    pub async fn detect_from(&self, candidates: &[BackendId]) -> Result<BackendId, CaptureError> {
        let mut detected = self.detected.lock().await;
        let id = self.probe_in_order(candidates).await?;
        *detected = Some(id);
        Ok(id)
    }

    /// Forget the cached backend and detect again
    pub async fn reinitialize(&self) -> Result<BackendId, CaptureError> {
        let mut detected = self.detected.lock().await;
        if let Some(previous) = detected.take() {
            info!("Re-probing capture backends (previous: {})", previous);
        }

        let id = self.probe_in_order(&self.catalog.candidates()).await?;
        *detected = Some(id);
        Ok(id)
    }

    /// Run a single backend's capability test
    pub async fn is_usable(&self, id: BackendId) -> bool {
        match self.catalog.capability_test(id) {
            CapabilityTest::Command { program, args } => {
                match self.runner.run(&program, &args, self.timeout).await {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("Backend {} unavailable: {}", id, e);
                        false
                    }
                }
            }
            CapabilityTest::RemoteHost => self.transport.is_available().await,
        }
    }

    async fn probe_in_order(&self, candidates: &[BackendId]) -> Result<BackendId, CaptureError> {
        info!(
            "Probing capture backends on {}: {:?}",
            self.catalog.platform(),
            candidates
        );

        for id in candidates {
            if self.is_usable(*id).await {
                info!("Selected capture backend: {}", id);
                return Ok(*id);
            }
        }

        warn!("No capture backend available");
        Err(CaptureError::NoBackendAvailable {
            tried: candidates.to_vec(),
        })
    }
}
