use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Host platform a capture backend runs on
///
/// The string form matches `std::env::consts::OS`, which is also what gets
/// persisted next to a device preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// Platform this binary was compiled for
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macos" | "darwin" => Ok(Platform::MacOs),
            "windows" | "win32" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            other => anyhow::bail!("Unknown platform: {}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_matches_std_os_string() {
        let current = Platform::current();
        if cfg!(any(target_os = "macos", target_os = "windows", target_os = "linux")) {
            assert_eq!(current.as_str(), std::env::consts::OS);
        }
    }

    #[test]
    fn test_parse_accepts_node_style_names() {
        assert_eq!("darwin".parse::<Platform>().unwrap(), Platform::MacOs);
        assert_eq!("win32".parse::<Platform>().unwrap(), Platform::Windows);
        assert_eq!("Linux".parse::<Platform>().unwrap(), Platform::Linux);
        assert!("beos".parse::<Platform>().is_err());
    }
}
