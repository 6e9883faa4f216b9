// Input device discovery per platform
//
// - macOS: ffmpeg avfoundation listing (ids are device indices)
// - Windows: ffmpeg dshow listing (ids are "Alternative name" monikers)
// - Linux: `arecord -L` ALSA PCMs, then `pactl` sources as `pulse:<name>`

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::backend::{BackendCatalog, BackendId};
use crate::command::CommandRunner;
use crate::platform::Platform;

/// An input device as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Machine identifier, safe to persist
    pub id: String,
    /// Human-readable label
    pub name: String,
}

impl DeviceDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Value to pass as the backend's input selector
    ///
    /// SoX addresses coreaudio/waveaudio devices by label, everything else
    /// by id.
    pub fn argument_for(&self, backend: BackendId, platform: Platform) -> String {
        match (backend, platform) {
            (BackendId::NativeCapture, Platform::MacOs | Platform::Windows) => self.name.clone(),
            _ => self.id.clone(),
        }
    }
}

/// List input devices through the platform's discovery command
///
/// Returns an empty list when the discovery tool is missing or fails.
pub async fn enumerate_devices(
    runner: &dyn CommandRunner,
    catalog: &BackendCatalog,
    timeout: Duration,
) -> Vec<DeviceDescriptor> {
    let platform = catalog.platform();
    let devices = match platform {
        Platform::MacOs => {
            let Some(ffmpeg) = catalog.program(BackendId::Transcoder) else {
                return Vec::new();
            };
            let args = strings(&["-hide_banner", "-f", "avfoundation", "-list_devices", "true", "-i", ""]);
            let text = run_listing(runner, &ffmpeg, &args, timeout).await;
            parse_avfoundation_audio(&text)
        }
        Platform::Windows => {
            let Some(ffmpeg) = catalog.program(BackendId::Transcoder) else {
                return Vec::new();
            };
            let args = strings(&["-hide_banner", "-list_devices", "true", "-f", "dshow", "-i", "dummy"]);
            let text = run_listing(runner, &ffmpeg, &args, timeout).await;
            parse_dshow_audio(&text)
        }
        Platform::Linux => {
            let arecord = catalog
                .program(BackendId::NativeCapture)
                .unwrap_or_else(|| "arecord".to_string());
            let text = run_listing(runner, &arecord, &strings(&["-L"]), timeout).await;
            let alsa = parse_arecord_list(&text);
            if alsa.is_empty() {
                let text = run_listing(runner, "pactl", &strings(&["list", "short", "sources"]), timeout).await;
                parse_pactl_sources(&text)
            } else {
                alsa
            }
        }
    };

    info!("Enumerated {} input device(s) on {}", devices.len(), platform);
    devices
}

async fn run_listing(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[String],
    timeout: Duration,
) -> String {
    match runner.run(program, args, timeout).await {
        Ok(output) => output.combined(),
        // ffmpeg's listing mode always exits non-zero after printing devices
        Err(e) => e.output_text().unwrap_or_else(|| {
            debug!("Device listing via {} failed: {}", program, e);
            String::new()
        }),
    }
}

/// Parse the audio section of `ffmpeg -f avfoundation -list_devices true -i ""`
pub fn parse_avfoundation_audio(text: &str) -> Vec<DeviceDescriptor> {
    let mut devices = Vec::new();
    let mut in_audio = false;

    for line in text.lines() {
        if line.contains("AVFoundation audio devices") {
            in_audio = true;
            continue;
        }
        if line.contains("AVFoundation video devices") {
            in_audio = false;
            continue;
        }
        if !in_audio {
            continue;
        }

        // "[AVFoundation indev @ 0x7f8] [0] MacBook Pro Microphone"
        let Some(rest) = line.split_once("] ").map(|(_, rest)| rest.trim()) else {
            continue;
        };
        let Some(rest) = rest.strip_prefix('[') else {
            continue;
        };
        let Some((index, name)) = rest.split_once(']') else {
            continue;
        };
        if index.parse::<u32>().is_ok() {
            devices.push(DeviceDescriptor::new(index, name.trim()));
        }
    }

    devices
}

/// Parse `ffmpeg -list_devices true -f dshow -i dummy`
///
/// Handles both the `(audio)` suffix style and the older sectioned output.
pub fn parse_dshow_audio(text: &str) -> Vec<DeviceDescriptor> {
    let mut devices: Vec<DeviceDescriptor> = Vec::new();
    let mut in_audio_section = false;
    let mut last_was_audio = false;

    for line in text.lines() {
        let line = line.trim();
        if line.contains("DirectShow audio devices") {
            in_audio_section = true;
            continue;
        }
        if line.contains("DirectShow video devices") {
            in_audio_section = false;
            continue;
        }

        if line.contains("Alternative name") {
            if last_was_audio {
                if let (Some(device), Some(alt)) = (devices.last_mut(), first_quoted(line)) {
                    device.id = alt;
                }
            }
            continue;
        }

        let is_audio = line.contains("(audio)") || (in_audio_section && !line.contains("(video)"));
        last_was_audio = false;
        if !is_audio {
            continue;
        }
        if let Some(name) = first_quoted(line) {
            devices.push(DeviceDescriptor::new(name.clone(), name));
            last_was_audio = true;
        }
    }

    devices
}

const ALSA_SKIPPED: &[&str] = &[
    "null",
    "surround",
    "front:",
    "rear:",
    "center_lfe:",
    "side:",
    "iec958:",
    "hdmi:",
    "dmix:",
    "usbstream:",
    "lavrate",
    "samplerate",
    "speexrate",
    "upmix",
    "vdownmix",
];

/// Parse `arecord -L`: unindented lines are PCM names, the next indented
/// line is their description
pub fn parse_arecord_list(text: &str) -> Vec<DeviceDescriptor> {
    let mut devices: Vec<DeviceDescriptor> = Vec::new();
    let mut awaiting_description = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with(char::is_whitespace) {
            if awaiting_description {
                if let Some(device) = devices.last_mut() {
                    device.name = line.trim().to_string();
                }
                awaiting_description = false;
            }
            continue;
        }

        let pcm = line.trim();
        awaiting_description = false;
        if ALSA_SKIPPED.iter().any(|skip| pcm.starts_with(skip)) {
            continue;
        }
        devices.push(DeviceDescriptor::new(pcm, pcm));
        awaiting_description = true;
    }

    devices
}

/// Parse `pactl list short sources`, dropping monitor sources
pub fn parse_pactl_sources(text: &str) -> Vec<DeviceDescriptor> {
    text.lines()
        .filter_map(|line| line.split('\t').nth(1))
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.ends_with(".monitor"))
        .map(|name| DeviceDescriptor::new(format!("pulse:{}", name), name))
        .collect()
}

fn first_quoted(line: &str) -> Option<String> {
    let start = line.find('"')?;
    let rest = &line[start + 1..];
    let end = rest.find('"')?;
    let token = rest[..end].trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
