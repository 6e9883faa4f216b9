use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::platform::Platform;

/// Closed set of capture mechanisms the orchestrator knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendId {
    /// Dedicated CLI recorder (arecord on Linux, SoX elsewhere)
    NativeCapture,
    /// General-purpose media transcoder (ffmpeg)
    Transcoder,
    /// Windows PowerShell driving the MCI waveaudio device
    ShellSpeech,
    /// Media capture running inside a separate UI-hosting process
    BrowserEmbedded,
}

impl BackendId {
    pub const ALL: [BackendId; 4] = [
        BackendId::NativeCapture,
        BackendId::Transcoder,
        BackendId::ShellSpeech,
        BackendId::BrowserEmbedded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::NativeCapture => "native-capture",
            BackendId::Transcoder => "transcoder",
            BackendId::ShellSpeech => "shell-speech",
            BackendId::BrowserEmbedded => "browser-embedded",
        }
    }

    /// Whether capture happens in a local child process
    pub fn is_local(&self) -> bool {
        !matches!(self, BackendId::BrowserEmbedded)
    }

    pub fn is_supported_on(&self, platform: Platform) -> bool {
        match self {
            BackendId::ShellSpeech => platform == Platform::Windows,
            _ => true,
        }
    }

    /// Executable used when no override is configured
    pub fn default_program(&self, platform: Platform) -> Option<&'static str> {
        match (self, platform) {
            (BackendId::NativeCapture, Platform::Linux) => Some("arecord"),
            (BackendId::NativeCapture, _) => Some("sox"),
            (BackendId::Transcoder, _) => Some("ffmpeg"),
            (BackendId::ShellSpeech, _) => Some("powershell"),
            (BackendId::BrowserEmbedded, _) => None,
        }
    }

    /// Hand-tuned preference order per platform
    ///
    /// macOS and Windows try ffmpeg before SoX: SoX builds there are often
    /// missing the coreaudio/waveaudio drivers.
    pub fn default_order(platform: Platform) -> Vec<BackendId> {
        match platform {
            Platform::MacOs => vec![
                BackendId::Transcoder,
                BackendId::NativeCapture,
                BackendId::BrowserEmbedded,
            ],
            Platform::Windows => vec![
                BackendId::Transcoder,
                BackendId::NativeCapture,
                BackendId::ShellSpeech,
                BackendId::BrowserEmbedded,
            ],
            Platform::Linux => vec![
                BackendId::NativeCapture,
                BackendId::Transcoder,
                BackendId::BrowserEmbedded,
            ],
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        BackendId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("Unknown capture backend: {}", s))
    }
}

/// How a backend proves it is usable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityTest {
    /// Run a cheap command (version query) and expect exit code 0
    Command { program: String, args: Vec<String> },
    /// Ask the message transport whether the capture host is reachable
    RemoteHost,
}

/// Backend catalog for one host platform
///
/// Combines the built-in preference table with the per-platform order and
/// program overrides from configuration.
#[derive(Debug, Clone)]
pub struct BackendCatalog {
    platform: Platform,
    order: Vec<BackendId>,
    programs: HashMap<BackendId, String>,
}

impl BackendCatalog {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            order: BackendId::default_order(platform),
            programs: HashMap::new(),
        }
    }

    /// Build from the raw `[backends]` config tables
    ///
    /// Unknown platform or backend names are logged and ignored.
    pub fn from_overrides(
        platform: Platform,
        order: &HashMap<String, Vec<String>>,
        programs: &HashMap<String, String>,
    ) -> Self {
        let mut catalog = Self::new(platform);

        for (platform_name, ids) in order {
            match platform_name.parse::<Platform>() {
                Ok(p) if p == platform => {
                    let parsed: Vec<BackendId> = ids
                        .iter()
                        .filter_map(|id| match id.parse() {
                            Ok(id) => Some(id),
                            Err(e) => {
                                warn!("Ignoring backend order entry: {}", e);
                                None
                            }
                        })
                        .collect();
                    catalog = catalog.with_order(parsed);
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring backend order table: {}", e),
            }
        }

        for (id, program) in programs {
            match id.parse::<BackendId>() {
                Ok(id) => catalog = catalog.with_program(id, program.clone()),
                Err(e) => warn!("Ignoring program override: {}", e),
            }
        }

        catalog
    }

    pub fn with_order(mut self, order: Vec<BackendId>) -> Self {
        self.order = order;
        self
    }

    pub fn with_program(mut self, id: BackendId, program: impl Into<String>) -> Self {
        let program = program.into();
        if !program.trim().is_empty() {
            self.programs.insert(id, program);
        }
        self
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Candidates in preference order, skipping backends the host cannot run
    pub fn candidates(&self) -> Vec<BackendId> {
        let mut seen = Vec::new();
        for id in &self.order {
            if id.is_supported_on(self.platform) && !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen
    }

    pub fn program(&self, id: BackendId) -> Option<String> {
        if !id.is_local() {
            return None;
        }
        self.programs
            .get(&id)
            .cloned()
            .or_else(|| id.default_program(self.platform).map(str::to_string))
    }

    pub fn capability_test(&self, id: BackendId) -> CapabilityTest {
        let Some(program) = self.program(id) else {
            return CapabilityTest::RemoteHost;
        };

        let args: &[&str] = match id {
            BackendId::Transcoder => &["-hide_banner", "-version"],
            BackendId::ShellSpeech => &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "$PSVersionTable.PSVersion.Major",
            ],
            BackendId::NativeCapture | BackendId::BrowserEmbedded => &["--version"],
        };

        CapabilityTest::Command {
            program,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}
