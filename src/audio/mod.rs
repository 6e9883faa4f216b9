pub mod file;

pub use file::{write_pcm16_wav, AudioFile};
