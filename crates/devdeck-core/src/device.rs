//! Attached device model

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized connection status from the device enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Online,
    Unauthorized,
    Offline,
    #[default]
    Unknown,
}

impl ConnectionStatus {
    /// Normalize a raw status token (`device`, `unauthorized`, `offline`, ...)
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "device" => ConnectionStatus::Online,
            "unauthorized" => ConnectionStatus::Unauthorized,
            "offline" => ConnectionStatus::Offline,
            _ => ConnectionStatus::Unknown,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Online => write!(f, "online"),
            ConnectionStatus::Unauthorized => write!(f, "unauthorized"),
            ConnectionStatus::Offline => write!(f, "offline"),
            ConnectionStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of probing one device's root and overlay state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct DeviceStatus {
    pub is_rooted: bool,
    pub has_writable_overlay: bool,
}

/// An attached device (physical or emulated)
///
/// `is_rooted` and `has_writable_overlay` are stale until the first probe
/// completes; they default to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Device {
    /// Stable identifier, used as the join key for all per-device state
    pub id: String,

    /// Normalized connection status
    pub status: ConnectionStatus,

    /// Status token exactly as enumerated (empty if the line only had an id)
    #[serde(default)]
    pub raw_status: String,

    #[serde(default)]
    pub is_rooted: bool,

    /// System/vendor partitions are mounted through an overlay filesystem
    #[serde(default)]
    pub has_writable_overlay: bool,
}

impl Device {
    pub fn new(id: impl Into<String>, raw_status: impl Into<String>) -> Self {
        let raw_status = raw_status.into();
        Self {
            id: id.into(),
            status: ConnectionStatus::from_raw(&raw_status),
            raw_status,
            is_rooted: false,
            has_writable_overlay: false,
        }
    }

    /// Refresh every field from a newer observation of the same device
    pub fn refresh_from(&mut self, newer: &Device) {
        debug_assert_eq!(self.id, newer.id);
        self.status = newer.status;
        self.raw_status.clone_from(&newer.raw_status);
        self.is_rooted = newer.is_rooted;
        self.has_writable_overlay = newer.has_writable_overlay;
    }

    pub fn apply_status(&mut self, status: DeviceStatus) {
        self.is_rooted = status.is_rooted;
        self.has_writable_overlay = status.has_writable_overlay;
    }

    /// Short badges for list views, e.g. `[Rooted] [Remounted]`
    pub fn badges(&self) -> String {
        let root = if self.is_rooted {
            "[Rooted]"
        } else {
            "[Non-Rooted]"
        };
        let overlay = if self.has_writable_overlay {
            "[Remounted]"
        } else {
            "[Non-Remounted]"
        };
        format!("{} {}", root, overlay)
    }
}

/// Keep the current selection if that device is still attached, otherwise
/// fall back to the first device in the list.
pub fn resolve_selection(devices: &[Device], current: Option<&str>) -> Option<String> {
    if let Some(id) = current {
        if devices.iter().any(|d| d.id == id) {
            return Some(id.to_string());
        }
    }
    devices.first().map(|d| d.id.clone())
}
