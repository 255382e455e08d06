//! Test utilities for device types
//!
//! Provides helper constructors and a scripted [`DeviceProbe`] implementation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use devdeck_core::Device;

use crate::probe::DeviceProbe;

/// Creates an online test device.
pub fn test_device(id: &str) -> Device {
    Device::new(id, "device")
}

/// Creates a test device with full control over probed fields.
pub fn test_device_full(id: &str, raw_status: &str, rooted: bool, overlay: bool) -> Device {
    let mut device = Device::new(id, raw_status);
    device.is_rooted = rooted;
    device.has_writable_overlay = overlay;
    device
}

/// Scripted probe for monitor and engine tests
///
/// Counts enumerations and tracks how many run at once, so tests can assert
/// coalescing and the absence of overlapping refreshes.
#[derive(Debug, Default)]
pub struct FakeProbe {
    devices: Mutex<Vec<Device>>,
    rooted: HashSet<String>,
    overlay: HashSet<String>,
    panicking: HashSet<String>,
    delay: Duration,
    enumerations: AtomicUsize,
    status_checks: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeProbe {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: Mutex::new(devices),
            ..Default::default()
        }
    }

    pub fn with_rooted(mut self, ids: &[&str]) -> Self {
        self.rooted = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_overlay(mut self, ids: &[&str]) -> Self {
        self.overlay = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Checks for these ids panic, simulating a crashed probe task
    pub fn with_panicking(mut self, ids: &[&str]) -> Self {
        self.panicking = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Make every enumeration take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the devices returned by the next enumeration
    pub fn set_devices(&self, devices: Vec<Device>) {
        *self.devices.lock().unwrap_or_else(|e| e.into_inner()) = devices;
    }

    pub fn enumerate_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Number of `check_rooted` calls
    pub fn status_check_count(&self) -> usize {
        self.status_checks.load(Ordering::SeqCst)
    }

    /// Highest number of enumerations observed running at once
    pub fn max_concurrent_enumerations(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl DeviceProbe for FakeProbe {
    async fn enumerate(&self) -> Vec<Device> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Snapshot at call time, like a real enumeration command
        let devices = self
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        devices
    }

    async fn check_rooted(&self, device_id: &str) -> bool {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(device_id) {
            panic!("scripted probe failure for {}", device_id);
        }
        self.rooted.contains(device_id)
    }

    async fn check_writable_overlay(&self, device_id: &str) -> bool {
        self.overlay.contains(device_id)
    }
}
