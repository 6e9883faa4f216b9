/// Value persisted when the user never picked a device
pub const AUTO_DEVICE: &str = "auto";

/// Literal older UI builds persisted instead of a device id
pub const LEGACY_SENTINEL: &str = "undefined";

/// What a stored device preference actually asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreferenceCheck {
    /// No preference: resolve automatically
    Auto,
    /// A machine device id worth verifying
    Device(String),
    /// A human-readable label from an older release; must be discarded
    Legacy(String),
}

/// Machine ids never contain whitespace or parentheses; labels like
/// "Built-in Mic (Realtek)" do.
pub fn is_legacy_device_label(value: &str) -> bool {
    value == LEGACY_SENTINEL
        || value.chars().any(|c| c.is_whitespace() || c == '(' || c == ')')
}

pub fn check_preference(value: Option<&str>) -> PreferenceCheck {
    match value {
        None => PreferenceCheck::Auto,
        Some(v) if v.is_empty() || v == AUTO_DEVICE => PreferenceCheck::Auto,
        Some(v) if is_legacy_device_label(v) => PreferenceCheck::Legacy(v.to_string()),
        Some(v) => PreferenceCheck::Device(v.to_string()),
    }
}
