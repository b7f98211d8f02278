use std::fmt;

use serde::{Deserialize, Serialize};

/// A component's reported version. `code == 0` means it was not observed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFact {
    pub code: u32,
    pub label: String,
}

impl VersionFact {
    pub fn new(code: u32, label: impl Into<String>) -> Self {
        Self {
            code,
            label: label.into(),
        }
    }

    pub fn is_observed(&self) -> bool {
        self.code > 0
    }
}

/// One fetch worth of version metadata for the tracked system component and
/// for the application itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub tracked: VersionFact,
    pub app: VersionFact,
    pub channel_is_valid: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    NotInstalled,
    UpToDate,
    Obsolete,
    #[default]
    Loading,
}

impl ComponentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::UpToDate => "up_to_date",
            Self::Obsolete => "obsolete",
            Self::Loading => "loading",
        }
    }

    pub fn tracked_text(self) -> &'static str {
        match self {
            Self::NotInstalled => "Not installed",
            other => other.common_text(),
        }
    }

    /// For the application, "not installed" really means the update channel
    /// could not be used.
    pub fn app_text(self) -> &'static str {
        match self {
            Self::NotInstalled => "Update channel error",
            other => other.common_text(),
        }
    }

    fn common_text(self) -> &'static str {
        match self {
            Self::UpToDate => "Up to date",
            Self::Obsolete => "Update available",
            Self::Loading => "Loading",
            Self::NotInstalled => "Not installed",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts owned outside the reconciler: what is installed on the device and
/// what this build is.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalVersions {
    pub installed_code: u32,
    pub installed_label: String,
    pub own_build_code: u32,
    pub own_build_label: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device: String,
    pub product: String,
}

impl DeviceInfo {
    pub fn new(device: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            product: product.into(),
        }
    }

    pub fn from_env() -> Self {
        Self {
            device: std::env::var("DEVHUB_DEVICE").unwrap_or_default(),
            product: std::env::var("DEVHUB_PRODUCT").unwrap_or_default(),
        }
    }

    /// Emulator images report "generic" somewhere in their build names.
    pub fn is_emulator(&self) -> bool {
        self.device.contains("generic") || self.product.contains("generic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_differs_only_for_not_installed() {
        assert_eq!(ComponentStatus::NotInstalled.tracked_text(), "Not installed");
        assert_eq!(ComponentStatus::NotInstalled.app_text(), "Update channel error");
        for status in [
            ComponentStatus::UpToDate,
            ComponentStatus::Obsolete,
            ComponentStatus::Loading,
        ] {
            assert_eq!(status.tracked_text(), status.app_text());
        }
    }

    #[test]
    fn emulator_detection_checks_device_and_product() {
        assert!(DeviceInfo::new("generic_x86_64", "sdk_phone").is_emulator());
        assert!(DeviceInfo::new("walleye", "sdk_gphone_generic").is_emulator());
        assert!(!DeviceInfo::new("walleye", "walleye").is_emulator());
        assert!(!DeviceInfo::default().is_emulator());
    }

    #[test]
    fn version_fact_zero_code_is_unobserved() {
        assert!(!VersionFact::default().is_observed());
        assert!(VersionFact::new(1, "1.0").is_observed());
    }
}
