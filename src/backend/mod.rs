//! Capture backends: what exists, which one to use, how to invoke it

mod descriptor;
mod invocation;
mod prober;

pub use descriptor::{BackendCatalog, BackendId, CapabilityTest};
pub use invocation::{
    build_invocation, default_device_token, output_extension, verification_args, CaptureFormat,
    Invocation, StopStrategy, DEFAULT_DEVICE,
};
pub use prober::BackendProber;
