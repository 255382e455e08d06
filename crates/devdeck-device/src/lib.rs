//! # devdeck-device - Process and Device Management
//!
//! Runs external commands, probes attached devices through the device bridge,
//! and keeps a debounced, hotplug-driven view of the attached device set.
//!
//! Depends on [`devdeck_core`] for domain types and error handling.
//!
//! ## Public API
//!
//! ### Process Runner
//! - [`ProcessRunner`] - Launch a command line and stream its output
//! - [`ProcessStream`] - Incremental [`ProcessEvent`](devdeck_core::ProcessEvent)s of one child
//! - [`CommandLine`], [`HostShell`] - What to run and through which shell
//!
//! ### Device Probe
//! - [`DeviceProbe`] - Enumerate devices, check root and overlay state
//! - [`BridgeProbe`] - Implementation over `adb`-style bridge commands
//! - [`parse_devices_output()`] - Lenient `devices` output parser
//!
//! ### Device Monitor
//! - [`DeviceMonitor`] - Debounced refresh actor owning the known device set
//! - [`MonitorHandle`] - Signal, refresh, subscribe, snapshot
//! - [`DebounceTimer`] - Single-shot resettable timer
//! - [`HotplugWatcher`] - Filesystem notifications as monitor signals

pub mod hotplug;
pub mod monitor;
pub mod probe;
pub mod process;
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_utils;
pub mod timer;

// Public API re-exports
pub use hotplug::{HotplugWatcher, DEFAULT_HOTPLUG_PATH};
pub use monitor::{
    merge_devices, DeviceMonitor, MonitorConfig, MonitorHandle, MonitorState, DEFAULT_DEBOUNCE,
};
pub use probe::{
    has_overlay_mount, is_rooted_output, locate_bridge, parse_devices_output, probe_device,
    BridgeProbe, DeviceProbe, LocalDeviceProbe, DEFAULT_BRIDGE_PROGRAM, DEFAULT_PROBE_TIMEOUT,
};
pub use process::{
    CapturedOutput, CommandLine, HostShell, ProcessRunner, ProcessStream, LAUNCH_FAILURE_CODE,
};
pub use timer::DebounceTimer;
