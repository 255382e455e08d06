//! Configuration types for devdeck
//!
//! Defines `Settings` and its per-section sub-types. Every field has a
//! default so a partial `config.toml` is always valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use devdeck_device::{
    BridgeProbe, HostShell, MonitorConfig, DEFAULT_BRIDGE_PROGRAM, DEFAULT_HOTPLUG_PATH,
};

/// Global application settings from config.toml
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub shell: ShellSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub execution: ExecutionSettings,
}

/// Device bridge (`adb`) settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BridgeSettings {
    /// Bridge program name or path
    #[serde(default = "default_bridge_program")]
    pub program: String,

    /// Global arguments placed before every probe subcommand
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for each probe command
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            program: default_bridge_program(),
            args: Vec::new(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl BridgeSettings {
    pub fn probe(&self) -> BridgeProbe {
        BridgeProbe::new(self.program.clone())
            .with_base_args(self.args.clone())
            .with_timeout(Duration::from_millis(self.probe_timeout_ms))
    }
}

fn default_bridge_program() -> String {
    DEFAULT_BRIDGE_PROGRAM.to_string()
}

fn default_probe_timeout_ms() -> u64 {
    10_000
}

/// Host shell used for command steps
///
/// Empty `program` means the platform default (`sh -c`, or `cmd /C` with a UTF-8 code page).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ShellSettings {
    #[serde(default)]
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,
}

impl ShellSettings {
    pub fn host_shell(&self) -> HostShell {
        if self.program.trim().is_empty() {
            HostShell::default()
        } else {
            HostShell::new(self.program.clone(), self.args.clone())
        }
    }
}

/// Device monitor settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorSettings {
    /// Quiet period after the last hotplug signal before probing
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_true")]
    pub watch_hotplug: bool,

    #[serde(default = "default_hotplug_paths")]
    pub hotplug_paths: Vec<PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            watch_hotplug: true,
            hotplug_paths: default_hotplug_paths(),
        }
    }
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            ..Default::default()
        }
    }
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_hotplug_paths() -> Vec<PathBuf> {
    vec![PathBuf::from(DEFAULT_HOTPLUG_PATH)]
}

fn default_true() -> bool {
    true
}

/// Execution engine settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionSettings {
    /// Events buffered per run before the engine waits for the consumer
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}
