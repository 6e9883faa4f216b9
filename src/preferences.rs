//! Persisted input device preference
//!
//! Stored as `{ "preferredDevice": "...", "platform": "..." }`. A record
//! written on another platform is ignored: device ids do not travel.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::warn;

use crate::device::AUTO_DEVICE;
use crate::platform::Platform;

const PREFERENCE_FILE_NAME: &str = "device.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePreference {
    pub preferred_device: String,
    pub platform: String,
}

impl DevicePreference {
    pub fn new(device: impl Into<String>, platform: Platform) -> Self {
        Self {
            preferred_device: device.into(),
            platform: platform.as_str().to_string(),
        }
    }

    pub fn auto(platform: Platform) -> Self {
        Self::new(AUTO_DEVICE, platform)
    }

    /// The stored device if it was recorded on `platform`
    pub fn device_for(&self, platform: Platform) -> Option<&str> {
        match self.platform.parse::<Platform>() {
            Ok(p) if p == platform => Some(self.preferred_device.as_str()),
            _ => None,
        }
    }
}

/// Load/save access to the external settings store
pub trait PreferenceStore: Send + Sync {
    fn load(&self) -> Result<Option<DevicePreference>>;

    fn save(&self, preference: &DevicePreference) -> Result<()>;
}

/// JSON file under the user's home directory
#[derive(Debug, Clone)]
pub struct JsonPreferenceStore {
    path: PathBuf,
}

impl JsonPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<home>/.loqa/capture/device.json`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".loqa").join("capture").join(PREFERENCE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for JsonPreferenceStore {
    fn load(&self) -> Result<Option<DevicePreference>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        match serde_json::from_str::<DevicePreference>(&contents) {
            Ok(preference) => Ok(Some(preference)),
            Err(e) => {
                // A corrupt file means "auto", not a dead recorder
                warn!("Ignoring unreadable device preference {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    fn save(&self, preference: &DevicePreference) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(preference)?;

        // Write to a sibling temp file and rename over the target
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

        if cfg!(windows) && self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        }

        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to move preference into {}", self.path.display()))?;
        Ok(())
    }
}

/// In-memory store for embedding hosts that persist settings themselves
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    preference: Mutex<Option<DevicePreference>>,
    saves: AtomicUsize,
}

impl MemoryPreferenceStore {
    pub fn new(preference: Option<DevicePreference>) -> Self {
        Self {
            preference: Mutex::new(preference),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<DevicePreference> {
        self.preference
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Option<DevicePreference>> {
        Ok(self.current())
    }

    fn save(&self, preference: &DevicePreference) -> Result<()> {
        *self.preference.lock().unwrap_or_else(|e| e.into_inner()) = Some(preference.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
