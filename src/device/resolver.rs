use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::enumerate::{enumerate_devices, DeviceDescriptor};
use crate::backend::{default_device_token, verification_args, BackendCatalog, BackendId, CaptureFormat};
use crate::command::CommandRunner;
use crate::platform::Platform;

/// Which layer of the policy produced the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceSource {
    Preference,
    Enumerated,
    EnumeratedUnverified,
    WellKnown,
    BackendDefault,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDevice {
    /// Value handed to the backend's input selector
    pub argument: String,
    pub source: DeviceSource,
    /// The user's preference was tried and failed live verification
    pub preference_rejected: bool,
}

/// Picks the input device argument for a backend
///
/// Policy: verified preference, then verified enumerated devices, then the
/// head of the unverified enumeration, then verified well-known names, then
/// the backend's default token. Resolution never fails.
pub struct DeviceResolver {
    catalog: BackendCatalog,
    runner: Arc<dyn CommandRunner>,
    format: CaptureFormat,
    verify_timeout: Duration,
    enumerate_timeout: Duration,
}

impl DeviceResolver {
    pub fn new(
        catalog: BackendCatalog,
        runner: Arc<dyn CommandRunner>,
        format: CaptureFormat,
        verify_timeout: Duration,
        enumerate_timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            runner,
            format,
            verify_timeout,
            enumerate_timeout,
        }
    }

    fn platform(&self) -> Platform {
        self.catalog.platform()
    }

    pub async fn list_devices(&self) -> Vec<DeviceDescriptor> {
        enumerate_devices(self.runner.as_ref(), &self.catalog, self.enumerate_timeout).await
    }

    /// Whether the backend can be checked against a device locally
    pub fn can_verify(&self, backend: BackendId) -> bool {
        self.catalog.program(backend).is_some()
            && verification_args(backend, self.platform(), "", self.format).is_some()
    }

    /// Short live capture against `device`
    pub async fn verify(&self, backend: BackendId, device: &str) -> bool {
        let (Some(program), Some(args)) = (
            self.catalog.program(backend),
            verification_args(backend, self.platform(), device, self.format),
        ) else {
            return true;
        };

        match self.runner.run(&program, &args, self.verify_timeout).await {
            Ok(_) => {
                debug!("Device '{}' verified with {}", device, backend);
                true
            }
            Err(e) => {
                debug!("Device '{}' failed verification with {}: {}", device, backend, e);
                false
            }
        }
    }

    /// `preference` must already be a machine id (legacy labels and "auto"
    /// are filtered by the caller).
    pub async fn resolve_input_device(
        &self,
        backend: BackendId,
        preference: Option<&str>,
    ) -> ResolvedDevice {
        let platform = self.platform();
        let preference = preference.filter(|p| !p.is_empty());

        if !self.can_verify(backend) {
            // The capture host owns the devices; nothing to probe from here
            return match preference {
                Some(device) => resolved(device, DeviceSource::Preference, false),
                None => resolved(
                    default_device_token(backend, platform),
                    DeviceSource::BackendDefault,
                    false,
                ),
            };
        }

        let mut preference_rejected = false;
        if let Some(device) = preference {
            let argument = self.preference_argument(backend, device).await;
            if self.verify(backend, &argument).await {
                info!("Using preferred input device '{}'", argument);
                return resolved(&argument, DeviceSource::Preference, false);
            }
            warn!(
                "Preferred input device '{}' failed verification, falling back",
                device
            );
            preference_rejected = true;
        }

        let devices = self.list_devices().await;
        let candidates: Vec<String> = devices
            .iter()
            .map(|d| d.argument_for(backend, platform))
            .collect();

        if !candidates.is_empty() {
            for (device, candidate) in devices.iter().zip(&candidates) {
                if preference == Some(device.id.as_str()) {
                    continue;
                }
                if self.verify(backend, candidate).await {
                    info!("Using enumerated input device '{}'", candidate);
                    return resolved(candidate, DeviceSource::Enumerated, preference_rejected);
                }
            }
            warn!(
                "No enumerated device passed verification, using '{}' unverified",
                candidates[0]
            );
            return resolved(
                &candidates[0],
                DeviceSource::EnumeratedUnverified,
                preference_rejected,
            );
        }

        for name in well_known_devices(backend, platform) {
            if self.verify(backend, name).await {
                info!("Using well-known input device '{}'", name);
                return resolved(name, DeviceSource::WellKnown, preference_rejected);
            }
        }

        let token = default_device_token(backend, platform);
        warn!("Device resolution exhausted, falling back to '{}'", token);
        resolved(token, DeviceSource::BackendDefault, preference_rejected)
    }
}

impl DeviceResolver {
    /// Stored preferences are ids; map to a label for backends that want one
    async fn preference_argument(&self, backend: BackendId, preference: &str) -> String {
        let platform = self.platform();
        let probe = DeviceDescriptor::new(preference, "");
        if probe.argument_for(backend, platform) == preference {
            return preference.to_string();
        }

        self.list_devices()
            .await
            .into_iter()
            .find(|d| d.id == preference)
            .map(|d| d.argument_for(backend, platform))
            .unwrap_or_else(|| preference.to_string())
    }
}

fn resolved(argument: &str, source: DeviceSource, preference_rejected: bool) -> ResolvedDevice {
    ResolvedDevice {
        argument: argument.to_string(),
        source,
        preference_rejected,
    }
}

/// Names that exist on most machines of a platform
pub fn well_known_devices(backend: BackendId, platform: Platform) -> &'static [&'static str] {
    match (backend, platform) {
        (_, Platform::Linux) => &["default", "pulse", "pipewire", "sysdefault", "plughw:0,0"],
        (BackendId::Transcoder, Platform::MacOs) => &["0", "default"],
        (_, Platform::MacOs) => &[
            "MacBook Pro Microphone",
            "MacBook Air Microphone",
            "Built-in Microphone",
        ],
        (_, Platform::Windows) => &["Microphone", "Microphone Array", "Headset Microphone"],
    }
}
