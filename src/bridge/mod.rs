//! Cross-process capture bridge
//!
//! Capture runs inside a separate host process (browser-embedded media
//! capture); this side sends start/stop commands and turns the host's
//! events into the same session lifecycle the local supervisor produces.

mod messages;
mod nats;
mod remote;
mod transport;

pub use messages::{BridgeCommand, BridgeEvent, ContainerFormat};
pub use nats::NatsTransport;
pub use remote::CaptureBridge;
pub use transport::{ChannelTransport, EventEmitter, HostEndpoint, MessageTransport, NullTransport};
