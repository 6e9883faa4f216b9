use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::{BackendCatalog, CaptureFormat};
use crate::platform::Platform;
use crate::preferences::JsonPreferenceStore;
use crate::session::LevelSettings;

const ENV_PREFIX: &str = "LOQA_CAPTURE";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub backends: BackendsConfig,
    pub bridge: BridgeConfig,
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-capture".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3471,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Empty means the system temp directory
    pub output_dir: String,
    pub probe_timeout_ms: u64,
    pub device_probe_timeout_ms: u64,
    pub enumerate_timeout_ms: u64,
    pub level_interval_ms: u64,
    pub level_buffer_len: usize,
    pub stop_grace_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            output_dir: String::new(),
            probe_timeout_ms: 4000,
            device_probe_timeout_ms: 3000,
            enumerate_timeout_ms: 5000,
            level_interval_ms: 100,
            level_buffer_len: 1024,
            stop_grace_ms: 3000,
        }
    }
}

impl CaptureConfig {
    pub fn format(&self) -> CaptureFormat {
        CaptureFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        if self.output_dir.trim().is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(shellexpand::tilde(&self.output_dir).into_owned())
        }
    }

    pub fn levels(&self) -> LevelSettings {
        LevelSettings {
            interval: Duration::from_millis(self.level_interval_ms.max(1)),
            buffer_len: self.level_buffer_len,
            sample_rate: self.sample_rate,
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn device_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.device_probe_timeout_ms)
    }

    pub fn enumerate_timeout(&self) -> Duration {
        Duration::from_millis(self.enumerate_timeout_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// Overrides for the backend preference table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Platform name -> backend ids in preference order
    pub order: HashMap<String, Vec<String>>,
    /// Backend id -> executable path
    pub programs: HashMap<String, String>,
}

impl BackendsConfig {
    pub fn catalog(&self, platform: Platform) -> BackendCatalog {
        BackendCatalog::from_overrides(platform, &self.order, &self.programs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Empty disables the remote capture host
    pub nats_url: String,
    pub subject_prefix: String,
    pub host_id: String,
    pub finish_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            nats_url: String::new(),
            subject_prefix: "loqa.capture".to_string(),
            host_id: "default".to_string(),
            finish_timeout_ms: 10_000,
        }
    }
}

impl BridgeConfig {
    pub fn finish_timeout(&self) -> Duration {
        Duration::from_millis(self.finish_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PreferencesConfig {
    /// Empty means `<home>/.loqa/capture/device.json`
    pub path: String,
}

impl PreferencesConfig {
    pub fn path(&self) -> Result<PathBuf> {
        if self.path.trim().is_empty() {
            JsonPreferenceStore::default_path()
        } else {
            Ok(PathBuf::from(shellexpand::tilde(&self.path).into_owned()))
        }
    }
}

impl Config {
    /// Load `path` (extension optional, file optional) under
    /// `LOQA_CAPTURE__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}
