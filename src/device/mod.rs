//! Input device discovery and selection

mod enumerate;
mod legacy;
mod resolver;

pub use enumerate::{
    enumerate_devices, parse_arecord_list, parse_avfoundation_audio, parse_dshow_audio,
    parse_pactl_sources, DeviceDescriptor,
};
pub use legacy::{check_preference, is_legacy_device_label, PreferenceCheck, AUTO_DEVICE, LEGACY_SENTINEL};
pub use resolver::{well_known_devices, DeviceResolver, DeviceSource, ResolvedDevice};
