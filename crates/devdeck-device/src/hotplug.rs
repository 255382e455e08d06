//! Hotplug signal source backed by filesystem notifications
//!
//! USB attach/detach shows up as node creation/removal under the USB device
//! tree. Each relevant event becomes one [`MonitorHandle::signal`] call; the
//! monitor's debounce window takes care of bursts.

use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use devdeck_core::prelude::*;

use crate::monitor::MonitorHandle;

/// USB device nodes on Linux
pub const DEFAULT_HOTPLUG_PATH: &str = "/dev/bus/usb";

/// Keeps the underlying watcher alive; dropping it stops the signals
pub struct HotplugWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl HotplugWatcher {
    /// Watch `paths` recursively and signal `monitor` on changes
    ///
    /// Paths that do not exist or cannot be watched are skipped with a
    /// warning. Only failing to create the watcher itself is an error.
    pub fn start(paths: &[PathBuf], monitor: MonitorHandle) -> Result<Self> {
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_hotplug_event(&event.kind) => {
                trace!("Hotplug event: {:?} {:?}", event.kind, event.paths);
                monitor.signal();
            }
            Ok(_) => {}
            Err(e) => warn!("Hotplug watch error: {}", e),
        })
        .map_err(|e| Error::hotplug(e.to_string()))?;

        let mut watched = Vec::new();
        for path in paths {
            if !path.exists() {
                warn!("Hotplug path {} does not exist; skipping", path.display());
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    debug!("Watching {} for hotplug events", path.display());
                    watched.push(path.clone());
                }
                Err(e) => warn!("Cannot watch {}: {}", path.display(), e),
            }
        }

        if watched.is_empty() {
            warn!("No hotplug paths watched; device list refreshes on demand only");
        }

        Ok(Self {
            _watcher: watcher,
            watched,
        })
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }

    pub fn is_watching(&self, path: &Path) -> bool {
        self.watched.iter().any(|p| p == path)
    }
}

/// Reads of the device nodes (the bridge itself opens them) are not hotplug
fn is_hotplug_event(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}
