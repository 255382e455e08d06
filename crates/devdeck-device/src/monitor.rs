//! Device monitor actor
//!
//! Owns the known device set and turns bursty hotplug signals into at most
//! one probe refresh at a time:
//!
//! ```text
//! Idle --signal--> Debouncing --timer--> Probing --done--> Idle
//!                  (signal re-arms)      (signal sets pending; a pending
//!                                         probe restarts immediately)
//! ```
//!
//! The set is only ever mutated inside the actor task. Consumers receive
//! [`DeviceListChange`] broadcasts or read `watch` snapshots.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use devdeck_core::prelude::*;
use devdeck_core::{Device, DeviceListChange};

use crate::probe::{probe_device, DeviceProbe};
use crate::timer::DebounceTimer;

/// Quiet period after the last hotplug signal before probing
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Debouncing,
    Probing,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub debounce: Duration,
    /// Capacity of the change broadcast; slow subscribers lag past this
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

#[derive(Debug)]
enum MonitorCommand {
    Signal,
    RefreshNow,
    Shutdown,
}

/// Cloneable handle to a running [`DeviceMonitor`]
///
/// [`signal`](Self::signal) is synchronous and may be called from any
/// thread, including non-async notifier callbacks.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    cmd_tx: mpsc::UnboundedSender<MonitorCommand>,
    change_tx: broadcast::Sender<DeviceListChange>,
    devices_rx: watch::Receiver<Vec<Device>>,
    state_rx: watch::Receiver<MonitorState>,
}

impl MonitorHandle {
    fn send(&self, command: MonitorCommand) {
        if self.cmd_tx.send(command).is_err() {
            trace!("Device monitor stopped; command dropped");
        }
    }

    /// A device may have been attached or detached
    pub fn signal(&self) {
        self.send(MonitorCommand::Signal);
    }

    /// Probe without waiting for the debounce window
    pub fn refresh_now(&self) {
        self.send(MonitorCommand::RefreshNow);
    }

    pub fn shutdown(&self) {
        self.send(MonitorCommand::Shutdown);
    }

    /// Receive every published device list, in probe-completion order
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceListChange> {
        self.change_tx.subscribe()
    }

    /// Snapshot of the known device set
    pub fn devices(&self) -> Vec<Device> {
        self.devices_rx.borrow().clone()
    }

    pub fn watch_devices(&self) -> watch::Receiver<Vec<Device>> {
        self.devices_rx.clone()
    }

    pub fn state(&self) -> MonitorState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<MonitorState> {
        self.state_rx.clone()
    }
}

/// What woke the actor loop
enum Wake {
    Command(Option<MonitorCommand>),
    TimerFired,
    ProbeFinished(Option<Vec<Device>>),
}

pub struct DeviceMonitor<P> {
    probe: Arc<P>,
    config: MonitorConfig,
    cmd_rx: mpsc::UnboundedReceiver<MonitorCommand>,
    change_tx: broadcast::Sender<DeviceListChange>,
    devices_tx: watch::Sender<Vec<Device>>,
    state_tx: watch::Sender<MonitorState>,
    timer: DebounceTimer,
    probe_task: Option<JoinHandle<Vec<Device>>>,
    known: Vec<Device>,
    state: MonitorState,
    pending: bool,
}

impl<P> DeviceMonitor<P>
where
    P: DeviceProbe + Sync + 'static,
{
    /// Start the monitor actor
    ///
    /// The actor stops on [`MonitorHandle::shutdown`] or once every handle
    /// has been dropped.
    pub fn spawn(probe: Arc<P>, config: MonitorConfig) -> (MonitorHandle, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (change_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (devices_tx, devices_rx) = watch::channel(Vec::new());
        let (state_tx, state_rx) = watch::channel(MonitorState::Idle);

        let handle = MonitorHandle {
            cmd_tx,
            change_tx: change_tx.clone(),
            devices_rx,
            state_rx,
        };

        let monitor = Self {
            probe,
            config,
            cmd_rx,
            change_tx,
            devices_tx,
            state_tx,
            timer: DebounceTimer::new(),
            probe_task: None,
            known: Vec::new(),
            state: MonitorState::Idle,
            pending: false,
        };

        (handle, tokio::spawn(monitor.run()))
    }

    async fn run(mut self) {
        info!(
            "Device monitor started (debounce {:?})",
            self.config.debounce
        );

        loop {
            let wake = tokio::select! {
                cmd = self.cmd_rx.recv() => Wake::Command(cmd),
                _ = self.timer.expired() => Wake::TimerFired,
                devices = join_probe(&mut self.probe_task) => Wake::ProbeFinished(devices),
            };

            match wake {
                Wake::Command(Some(MonitorCommand::Signal)) => self.on_signal(),
                Wake::Command(Some(MonitorCommand::RefreshNow)) => self.on_refresh_now(),
                Wake::Command(Some(MonitorCommand::Shutdown)) | Wake::Command(None) => break,
                Wake::TimerFired => {
                    debug!("Debounce window elapsed");
                    self.start_probe();
                }
                Wake::ProbeFinished(devices) => self.on_probe_finished(devices),
            }
        }

        self.timer.cancel();
        if let Some(task) = self.probe_task.take() {
            task.abort();
        }
        info!("Device monitor stopped");
    }

    fn on_signal(&mut self) {
        match self.state {
            MonitorState::Idle => {
                trace!("Hotplug signal: start debounce");
                self.timer.arm(self.config.debounce);
                self.set_state(MonitorState::Debouncing);
            }
            MonitorState::Debouncing => {
                trace!("Hotplug signal: re-arm debounce");
                self.timer.arm(self.config.debounce);
            }
            MonitorState::Probing => {
                trace!("Hotplug signal during probe: refresh pending");
                self.pending = true;
            }
        }
    }

    fn on_refresh_now(&mut self) {
        if self.state == MonitorState::Probing {
            self.pending = true;
            return;
        }
        self.timer.cancel();
        self.start_probe();
    }

    fn start_probe(&mut self) {
        self.set_state(MonitorState::Probing);
        self.probe_task = Some(tokio::spawn(probe_all(Arc::clone(&self.probe))));
    }

    fn on_probe_finished(&mut self, devices: Option<Vec<Device>>) {
        match devices {
            Some(fresh) => {
                let (added, removed) = merge_devices(&mut self.known, fresh);
                if !added.is_empty() || !removed.is_empty() {
                    info!("Devices changed: added {:?}, removed {:?}", added, removed);
                }
                self.devices_tx.send_replace(self.known.clone());
                let change = DeviceListChange {
                    devices: self.known.clone(),
                    added,
                    removed,
                };
                // No subscribers is fine; the watch snapshot still updates.
                let _ = self.change_tx.send(change);
            }
            None => warn!("Device probe task failed; keeping previous device list"),
        }

        if std::mem::take(&mut self.pending) {
            debug!("Starting pending refresh");
            self.start_probe();
        } else {
            self.set_state(MonitorState::Idle);
        }
    }

    fn set_state(&mut self, state: MonitorState) {
        self.state = state;
        self.state_tx.send_replace(state);
    }
}

/// Await the in-flight probe, if any; pending forever otherwise
async fn join_probe(task: &mut Option<JoinHandle<Vec<Device>>>) -> Option<Vec<Device>> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let result = handle.await;
    *task = None;
    match result {
        Ok(devices) => Some(devices),
        Err(e) => {
            error!("Device probe task panicked: {}", e);
            None
        }
    }
}

/// Enumerate, then check every device concurrently
///
/// A failing check only affects its own device.
async fn probe_all<P>(probe: Arc<P>) -> Vec<Device>
where
    P: DeviceProbe + Sync + 'static,
{
    let mut devices = probe.enumerate().await;

    let checks: Vec<_> = devices
        .iter()
        .map(|device| {
            let probe = Arc::clone(&probe);
            let id = device.id.clone();
            tokio::spawn(async move { probe_device(&*probe, &id).await })
        })
        .collect();

    for (device, check) in devices.iter_mut().zip(checks) {
        match check.await {
            Ok(status) => device.apply_status(status),
            Err(e) => warn!("Status check for {} failed: {}", device.id, e),
        }
    }

    devices
}

/// Merge a fresh enumeration into the known set
///
/// Matching ids are refreshed in place, new ids inserted, missing ids
/// dropped. The result follows enumeration order. Returns `(added, removed)`.
pub fn merge_devices(known: &mut Vec<Device>, fresh: Vec<Device>) -> (Vec<String>, Vec<String>) {
    let removed: Vec<String> = known
        .iter()
        .filter(|k| !fresh.iter().any(|f| f.id == k.id))
        .map(|k| k.id.clone())
        .collect();

    let mut added = Vec::new();
    let mut merged = Vec::with_capacity(fresh.len());
    for device in fresh {
        match known.iter_mut().find(|k| k.id == device.id) {
            Some(existing) => {
                existing.refresh_from(&device);
                merged.push(existing.clone());
            }
            None => {
                added.push(device.id.clone());
                merged.push(device);
            }
        }
    }

    *known = merged;
    (added, removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_device, FakeProbe};
    use tokio::time::{sleep, Instant};

    fn spawn_monitor(probe: &Arc<FakeProbe>) -> (MonitorHandle, JoinHandle<()>) {
        DeviceMonitor::spawn(Arc::clone(probe), MonitorConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_signals_probes_once() {
        let probe = Arc::new(FakeProbe::new(vec![test_device("a")]));
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();

        for _ in 0..5 {
            handle.signal();
            sleep(Duration::from_millis(100)).await;
        }

        let change = changes.recv().await.unwrap();
        assert_eq!(change.added, vec!["a".to_string()]);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.enumerate_count(), 1);
        assert_eq!(handle.state(), MonitorState::Idle);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_waits_for_quiet_window() {
        let probe = Arc::new(FakeProbe::new(vec![test_device("a")]));
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();
        let start = Instant::now();

        handle.signal();
        sleep(Duration::from_millis(600)).await;
        handle.signal();
        changes.recv().await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(1600));

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_during_probe_queues_one_more() {
        let probe = Arc::new(
            FakeProbe::new(vec![test_device("a")]).with_delay(Duration::from_millis(500)),
        );
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();
        let mut state = handle.watch_state();

        handle.signal();
        state
            .wait_for(|s| *s == MonitorState::Probing)
            .await
            .unwrap();

        probe.set_devices(vec![test_device("a"), test_device("b")]);
        handle.signal();
        handle.signal();

        let first = changes.recv().await.unwrap();
        let second = changes.recv().await.unwrap();
        assert_eq!(first.devices.len(), 1);
        assert_eq!(second.added, vec!["b".to_string()]);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(probe.enumerate_count(), 2);
        assert_eq!(probe.max_concurrent_enumerations(), 1);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_skips_debounce() {
        let probe = Arc::new(FakeProbe::new(vec![test_device("a")]));
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();
        let start = Instant::now();

        handle.refresh_now();
        changes.recv().await.unwrap();

        assert!(start.elapsed() < DEFAULT_DEBOUNCE);
        assert_eq!(handle.devices().len(), 1);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_device_is_removed() {
        let probe = Arc::new(FakeProbe::new(vec![test_device("a"), test_device("b")]));
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();

        handle.refresh_now();
        changes.recv().await.unwrap();

        probe.set_devices(vec![test_device("b")]);
        handle.signal();
        let change = changes.recv().await.unwrap();

        assert_eq!(change.removed, vec!["a".to_string()]);
        assert!(change.added.is_empty());
        let ids: Vec<_> = handle.devices().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b".to_string()]);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probed_flags_are_applied() {
        let probe = Arc::new(
            FakeProbe::new(vec![test_device("a"), test_device("b")])
                .with_rooted(&["a"])
                .with_overlay(&["b"]),
        );
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();

        handle.refresh_now();
        let change = changes.recv().await.unwrap();

        assert!(change.devices[0].is_rooted);
        assert!(!change.devices[0].has_writable_overlay);
        assert!(!change.devices[1].is_rooted);
        assert!(change.devices[1].has_writable_overlay);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_check_does_not_abort_others() {
        let probe = Arc::new(
            FakeProbe::new(vec![test_device("bad"), test_device("good")])
                .with_panicking(&["bad"])
                .with_rooted(&["good"]),
        );
        let (handle, task) = spawn_monitor(&probe);
        let mut changes = handle.subscribe();

        handle.refresh_now();
        let change = changes.recv().await.unwrap();

        assert_eq!(change.devices.len(), 2);
        assert!(!change.devices[0].is_rooted);
        assert!(change.devices[1].is_rooted);

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_stops_when_handles_dropped() {
        let probe = Arc::new(FakeProbe::new(vec![]));
        let (handle, task) = spawn_monitor(&probe);
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("monitor should stop")
            .unwrap();
    }

    #[test]
    fn test_merge_devices() {
        let mut known = vec![test_device("a"), test_device("b")];
        known[0].is_rooted = true;

        let mut refreshed_a = Device::new("a", "offline");
        refreshed_a.is_rooted = false;
        let fresh = vec![test_device("c"), refreshed_a];

        let (added, removed) = merge_devices(&mut known, fresh);

        assert_eq!(added, vec!["c".to_string()]);
        assert_eq!(removed, vec!["b".to_string()]);
        let ids: Vec<_> = known.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(known[1].raw_status, "offline");
        assert!(!known[1].is_rooted);
    }
}
