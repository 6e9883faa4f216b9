use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command sent to the capture host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeCommand {
    StartCapture {
        session_id: Uuid,
        device: String,
        sample_rate: u32,
        channels: u16,
    },
    StopCapture {
        session_id: Uuid,
    },
}

impl BridgeCommand {
    pub fn session_id(&self) -> Uuid {
        match self {
            BridgeCommand::StartCapture { session_id, .. } => *session_id,
            BridgeCommand::StopCapture { session_id } => *session_id,
        }
    }
}

/// Container of the finalized recording sent back by the capture host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Webm,
    Ogg,
    Wav,
    /// Raw little-endian 16-bit PCM, wrapped into WAV on write
    Pcm16,
}

impl ContainerFormat {
    /// Extension of the file written for this payload
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Webm => "webm",
            ContainerFormat::Ogg => "ogg",
            ContainerFormat::Wav | ContainerFormat::Pcm16 => "wav",
        }
    }
}

/// Event received from the capture host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BridgeEvent {
    Started {
        session_id: Uuid,
    },
    Data {
        session_id: Uuid,
        /// Base64-encoded audio chunk
        chunk: String,
    },
    Finished {
        session_id: Uuid,
        format: ContainerFormat,
        /// Base64-encoded recording
        payload: String,
    },
    Error {
        session_id: Uuid,
        message: String,
    },
}

impl BridgeEvent {
    pub fn data(session_id: Uuid, bytes: &[u8]) -> Self {
        BridgeEvent::Data {
            session_id,
            chunk: encode(bytes),
        }
    }

    pub fn finished(session_id: Uuid, format: ContainerFormat, bytes: &[u8]) -> Self {
        BridgeEvent::Finished {
            session_id,
            format,
            payload: encode(bytes),
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            BridgeEvent::Started { session_id }
            | BridgeEvent::Data { session_id, .. }
            | BridgeEvent::Finished { session_id, .. }
            | BridgeEvent::Error { session_id, .. } => *session_id,
        }
    }
}

pub fn encode(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .context("Invalid base64 payload from capture host")
}
