pub mod audio;
pub mod backend;
pub mod bridge;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod http;
pub mod orchestrator;
pub mod platform;
pub mod preferences;
pub mod session;

pub use audio::AudioFile;
pub use backend::{BackendCatalog, BackendId, BackendProber};
pub use bridge::{
    BridgeCommand, BridgeEvent, CaptureBridge, ChannelTransport, ContainerFormat, HostEndpoint,
    MessageTransport, NatsTransport, NullTransport,
};
pub use command::{CommandOutput, CommandRunner, RunError, SystemRunner};
pub use config::Config;
pub use device::{DeviceDescriptor, DeviceResolver, ResolvedDevice};
pub use error::{CaptureError, ErrorKind};
pub use http::{create_router, AppState};
pub use orchestrator::{CaptureOrchestrator, OrchestratorOptions};
pub use platform::Platform;
pub use preferences::{DevicePreference, JsonPreferenceStore, MemoryPreferenceStore, PreferenceStore};
pub use session::{
    CaptureEvent, CaptureRequest, CaptureSession, LocalCaptureSession, RecordingResult,
    SessionContext, SessionPhase, SessionSnapshot,
};
