use std::path::Path;

use super::descriptor::BackendId;
use crate::platform::Platform;

/// Device token handed to a backend when nothing better is known
pub const DEFAULT_DEVICE: &str = "default";

/// Audio format every local backend is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // 16kHz for speech models
            channels: 1,        // Mono
        }
    }
}

/// How to ask a running backend to finalize its file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopStrategy {
    /// SIGINT (arecord and SoX write the WAV header on interrupt)
    Interrupt,
    /// Write a line to stdin (`q` for ffmpeg, any line for the MCI script)
    StdinLine(String),
}

/// Fully resolved command line for one capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stop: StopStrategy,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, stop: StopStrategy) -> Self {
        Self {
            program: program.into(),
            args,
            stop,
        }
    }
}

/// File extension of what a backend writes
pub fn output_extension(backend: BackendId) -> &'static str {
    match backend {
        BackendId::BrowserEmbedded => "webm",
        _ => "wav",
    }
}

/// Build the capture command line for a local backend
///
/// Returns `None` for backends that do not run as a child process.
pub fn build_invocation(
    backend: BackendId,
    platform: Platform,
    program: &str,
    device: &str,
    output: &Path,
    format: CaptureFormat,
) -> Option<Invocation> {
    let output = output.to_string_lossy().into_owned();
    let rate = format.sample_rate.to_string();
    let channels = format.channels.to_string();

    let invocation = match backend {
        BackendId::NativeCapture if platform == Platform::Linux => {
            let args = strings(&["-q", "-D", device, "-f", "S16_LE", "-r", &rate, "-c", &channels, "-t", "wav", &output]);
            Invocation::new(program, args, StopStrategy::Interrupt)
        }
        BackendId::NativeCapture => {
            let mut args = strings(&["-q"]);
            args.extend(sox_input(platform, device));
            args.extend(strings(&["-r", &rate, "-c", &channels, "-b", "16", &output]));
            Invocation::new(program, args, StopStrategy::Interrupt)
        }
        BackendId::Transcoder => {
            let mut args = strings(&["-hide_banner", "-loglevel", "error"]);
            args.extend(ffmpeg_input(platform, device));
            args.extend(strings(&["-ac", &channels, "-ar", &rate, "-acodec", "pcm_s16le", "-y", &output]));
            Invocation::new(program, args, StopStrategy::StdinLine("q".to_string()))
        }
        BackendId::ShellSpeech => {
            let script = mci_record_script(&output, format);
            let args = strings(&["-NoProfile", "-NonInteractive", "-Command", &script]);
            Invocation::new(program, args, StopStrategy::StdinLine(String::new()))
        }
        BackendId::BrowserEmbedded => return None,
    };

    Some(invocation)
}

/// Arguments for a short live test of `device`
///
/// `None` means the backend cannot be verified locally.
pub fn verification_args(
    backend: BackendId,
    platform: Platform,
    device: &str,
    format: CaptureFormat,
) -> Option<Vec<String>> {
    let rate = format.sample_rate.to_string();
    let channels = format.channels.to_string();

    match backend {
        BackendId::NativeCapture if platform == Platform::Linux => Some(strings(&[
            "-q", "-D", device, "-f", "S16_LE", "-r", &rate, "-c", &channels, "-d", "1", "-t", "raw", "/dev/null",
        ])),
        BackendId::NativeCapture => {
            let mut args = strings(&["-q"]);
            args.extend(sox_input(platform, device));
            args.extend(strings(&["-n", "trim", "0", "0.1"]));
            Some(args)
        }
        BackendId::Transcoder => {
            let mut args = strings(&["-hide_banner", "-loglevel", "error"]);
            args.extend(ffmpeg_input(platform, device));
            args.extend(strings(&["-t", "0.1", "-f", "null", "-"]));
            Some(args)
        }
        BackendId::ShellSpeech | BackendId::BrowserEmbedded => None,
    }
}

/// Final fallback token when every resolution layer failed
pub fn default_device_token(backend: BackendId, platform: Platform) -> &'static str {
    match (backend, platform) {
        (BackendId::Transcoder, Platform::MacOs) => "0",
        _ => DEFAULT_DEVICE,
    }
}

fn ffmpeg_input(platform: Platform, device: &str) -> Vec<String> {
    match platform {
        Platform::Linux => match device.strip_prefix("pulse:") {
            Some(source) => strings(&["-f", "pulse", "-i", source]),
            None => strings(&["-f", "alsa", "-i", device]),
        },
        Platform::MacOs => vec![
            "-f".to_string(),
            "avfoundation".to_string(),
            "-i".to_string(),
            format!(":{}", device),
        ],
        Platform::Windows => vec![
            "-f".to_string(),
            "dshow".to_string(),
            "-i".to_string(),
            format!("audio={}", device),
        ],
    }
}

fn sox_input(platform: Platform, device: &str) -> Vec<String> {
    if device == DEFAULT_DEVICE {
        return strings(&["-d"]);
    }
    let driver = match platform {
        Platform::MacOs => "coreaudio",
        Platform::Windows => "waveaudio",
        Platform::Linux => "alsa",
    };
    strings(&["-t", driver, device])
}

// Records through the MCI waveaudio device until a line arrives on stdin.
fn mci_record_script(output: &str, format: CaptureFormat) -> String {
    let bytes_per_sec = format.sample_rate * u32::from(format.channels) * 2;
    let align = format.channels * 2;
    let path = output.replace('\'', "''");

    format!(
        r#"$ErrorActionPreference = 'Stop'
$sig = '[DllImport("winmm.dll", CharSet = CharSet.Unicode)] public static extern int mciSendString(string command, System.Text.StringBuilder ret, int retLen, IntPtr hwnd);'
$mci = Add-Type -MemberDefinition $sig -Name Mci -Namespace LoqaCapture -PassThru
function Send-Mci([string]$cmd) {{
    $code = $mci::mciSendString($cmd, $null, 0, [IntPtr]::Zero)
    if ($code -ne 0) {{ [Console]::Error.WriteLine("mci error $code on '$cmd'"); exit 1 }}
}}
Send-Mci 'open new type waveaudio alias loqa'
Send-Mci 'set loqa time format ms bitspersample 16 channels {channels} samplespersec {rate} bytespersec {bytes_per_sec} alignment {align}'
Send-Mci 'record loqa'
[void][Console]::In.ReadLine()
Send-Mci 'stop loqa'
Send-Mci ('save loqa "' + '{path}' + '"')
Send-Mci 'close loqa'
"#,
        channels = format.channels,
        rate = format.sample_rate,
        bytes_per_sec = bytes_per_sec,
        align = align,
        path = path,
    )
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}
