//! Synthetic level data for meters
//!
//! File-writing backends expose no live stream, so while recording we emit
//! a sine carrier under a slowly varying envelope. This is an approximation
//! for UI feedback only and does not reflect the captured signal.

use std::f64::consts::TAU;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::events::SessionContext;

const CARRIER_HZ: f64 = 440.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSettings {
    pub interval: Duration,
    pub buffer_len: usize,
    pub sample_rate: u32,
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            buffer_len: 1024,
            sample_rate: 16000,
        }
    }
}

pub struct SyntheticLevels {
    buffer_len: usize,
    sample_rate: f64,
    phase: f64,
    tick: u64,
}

impl SyntheticLevels {
    pub fn new(buffer_len: usize, sample_rate: u32) -> Self {
        Self {
            buffer_len,
            sample_rate: f64::from(sample_rate.max(1)),
            phase: 0.0,
            tick: 0,
        }
    }

    /// Next buffer as little-endian i16 PCM
    pub fn next_buffer(&mut self) -> Vec<u8> {
        let envelope = 0.35 + 0.25 * (self.tick as f64 * 0.35).sin();
        let step = TAU * CARRIER_HZ / self.sample_rate;

        let mut bytes = Vec::with_capacity(self.buffer_len * 2);
        for _ in 0..self.buffer_len {
            let sample = (self.phase.sin() * envelope * f64::from(i16::MAX)) as i16;
            bytes.extend_from_slice(&sample.to_le_bytes());
            self.phase = (self.phase + step) % TAU;
        }

        self.tick += 1;
        bytes
    }
}

/// Emit level buffers for `session_id` until aborted
pub fn spawn_level_task(ctx: SessionContext, session_id: Uuid, settings: LevelSettings) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut levels = SyntheticLevels::new(settings.buffer_len, settings.sample_rate);
        let mut ticker = tokio::time::interval(settings.interval);

        loop {
            ticker.tick().await;
            if ctx.cell.active().map(|(id, _, _)| id) != Some(session_id) {
                break;
            }
            ctx.audio_data(session_id, levels.next_buffer());
        }
    })
}
