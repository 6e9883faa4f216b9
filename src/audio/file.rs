use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::info;

/// A finished 16-bit WAV recording
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels.max(1) as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Whether the file has the format every backend is asked for
    pub fn is_speech_format(&self) -> bool {
        self.sample_rate == 16000 && self.channels == 1
    }
}

/// Wrap raw little-endian 16-bit PCM into a WAV file
///
/// A trailing odd byte is dropped.
pub fn write_pcm16_wav(path: &Path, pcm: &[u8], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    for pair in pcm.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
            .context("Failed to write sample")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm16_wrapped_as_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wrapped.wav");

        // 16000 samples of silence plus a stray byte
        let mut pcm = vec![0u8; 32000];
        pcm.push(7);
        write_pcm16_wav(&path, &pcm, 16000, 1).unwrap();

        let audio = AudioFile::open(&path).unwrap();
        assert_eq!(audio.samples.len(), 16000);
        assert!((audio.duration_seconds - 1.0).abs() < f64::EPSILON);
        assert!(audio.is_speech_format());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        assert!(AudioFile::open("/nonexistent/path/to/audio.wav").is_err());
    }
}
