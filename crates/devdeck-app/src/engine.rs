//! Execution engine: runs a request's steps in order against one device
//!
//! Every run goes through the global [`ExecutionGate`], so at most one
//! request executes at a time and queued requests start in submission order.
//! A run reports everything as [`ExecutionEvent`]s on its own channel:
//!
//! ```text
//! RunQueued → RunStarted → [DeviceProbed] →
//!     (StepStarted → OutputLine* → StepCompleted | StepSkipped)* → RunCompleted
//! ```
//!
//! A failing step never aborts the run. Cancelling (or dropping the
//! [`RunHandle`]) ends it with `RunCompleted { Cancelled }` and kills the
//! running command, if any.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use devdeck_core::prelude::*;
use devdeck_core::{
    render_command, substitute_device, ExecutionEvent, ExecutionRun, ProcessEvent, Request,
    RunStatus, SkipReason, Step, StepError,
};
use devdeck_device::{probe_device, CommandLine, DeviceProbe, MonitorHandle, ProcessRunner};

use crate::gate::{ExecutionGate, GatePermit, GateTicket};
use crate::picker::{DirectoryPicker, PickRequest};

/// Events buffered per run before the engine waits for the consumer
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// The run was cancelled, explicitly or by dropping its event receiver
#[derive(Debug)]
struct Cancelled;

type Flow<T = ()> = std::result::Result<T, Cancelled>;

pub struct ExecutionEngine<P, D> {
    probe: Arc<P>,
    picker: Arc<D>,
    runner: ProcessRunner,
    gate: ExecutionGate,
    monitor: Option<MonitorHandle>,
    event_buffer: usize,
    next_run_id: AtomicU64,
}

impl<P, D> ExecutionEngine<P, D>
where
    P: DeviceProbe + Sync + 'static,
    D: DirectoryPicker + Sync + 'static,
{
    pub fn new(probe: Arc<P>, picker: Arc<D>) -> Self {
        Self {
            probe,
            picker,
            runner: ProcessRunner::default(),
            gate: ExecutionGate::new(),
            monitor: None,
            event_buffer: DEFAULT_EVENT_BUFFER,
            next_run_id: AtomicU64::new(1),
        }
    }

    /// Shell and working directory for command steps
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Ask this monitor for a device-list refresh whenever a run starts
    pub fn with_monitor(mut self, monitor: MonitorHandle) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    /// Queue `request` for execution against `device_id`
    ///
    /// Fails with [`Error::NoDeviceSelected`] before anything is queued when
    /// the request has device commands and no device is selected. Must be
    /// called from within a tokio runtime.
    pub fn execute(&self, request: Arc<Request>, device_id: Option<String>) -> Result<RunHandle> {
        let device_id = device_id.filter(|id| !id.trim().is_empty());
        if request.requires_device() && device_id.is_none() {
            return Err(Error::no_device_selected(&request.alias));
        }

        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let (events_tx, events_rx) = mpsc::channel(self.event_buffer);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let ticket = self.gate.enqueue(&request.alias);
        info!(
            "Run {} queued: '{}' on {:?}",
            run_id, request.alias, device_id
        );

        let task = RunTask {
            run_id,
            request: Arc::clone(&request),
            device_id,
            probe: Arc::clone(&self.probe),
            picker: Arc::clone(&self.picker),
            runner: self.runner.clone(),
            monitor: self.monitor.clone(),
            events: events_tx,
            cancel_rx,
        };
        tokio::spawn(task.drive(ticket));

        Ok(RunHandle {
            id: run_id,
            alias: request.alias.clone(),
            events: events_rx,
            cancel: Arc::new(cancel_tx),
        })
    }
}

/// Caller's side of one run
///
/// Dropping the handle cancels the run.
#[derive(Debug)]
pub struct RunHandle {
    id: u64,
    alias: String,
    events: mpsc::Receiver<ExecutionEvent>,
    cancel: Arc<watch::Sender<bool>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Next event; `None` after `RunCompleted`
    pub async fn next_event(&mut self) -> Option<ExecutionEvent> {
        self.events.recv().await
    }

    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancel from elsewhere (e.g. a Ctrl-C handler) while events are consumed
    pub fn canceller(&self) -> RunCanceller {
        RunCanceller(Arc::clone(&self.cancel))
    }

    /// Drain every event into a run record
    pub async fn collect(mut self) -> ExecutionRun {
        let mut run = ExecutionRun::new(self.alias.clone());
        while let Some(event) = self.next_event().await {
            run.apply(&event);
        }
        run
    }
}

#[derive(Debug, Clone)]
pub struct RunCanceller(Arc<watch::Sender<bool>>);

impl RunCanceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Resolves once cancellation is requested or every canceller is gone
async fn wait_cancelled(cancel_rx: &mut watch::Receiver<bool>) {
    let _ = cancel_rx.wait_for(|cancelled| *cancelled).await;
}

/// Per-run state owned by the spawned run task
struct RunTask<P, D> {
    run_id: u64,
    request: Arc<Request>,
    device_id: Option<String>,
    probe: Arc<P>,
    picker: Arc<D>,
    runner: ProcessRunner,
    monitor: Option<MonitorHandle>,
    events: mpsc::Sender<ExecutionEvent>,
    cancel_rx: watch::Receiver<bool>,
}

impl<P, D> RunTask<P, D>
where
    P: DeviceProbe + Sync + 'static,
    D: DirectoryPicker + Sync + 'static,
{
    async fn drive(mut self, ticket: GateTicket) {
        let mut permit = None;
        let status = self
            .run(ticket, &mut permit)
            .await
            .unwrap_or(RunStatus::Cancelled);

        info!(
            "Run {} '{}' finished: {}",
            self.run_id, self.request.alias, status
        );
        let _ = self
            .emit(ExecutionEvent::RunCompleted {
                alias: self.request.alias.clone(),
                status,
            })
            .await;

        // Release only after RunCompleted so the next run's events follow it
        drop(permit);
    }

    async fn run(
        &mut self,
        ticket: GateTicket,
        permit: &mut Option<GatePermit>,
    ) -> Flow<RunStatus> {
        let alias = self.request.alias.clone();
        self.emit(ExecutionEvent::RunQueued {
            alias: alias.clone(),
        })
        .await?;

        *permit = Some(tokio::select! {
            granted = ticket.acquire() => granted,
            _ = wait_cancelled(&mut self.cancel_rx) => {
                debug!("Run {} cancelled while queued", self.run_id);
                return Err(Cancelled);
            }
        });

        info!("Run {} started: '{}'", self.run_id, alias);
        self.emit(ExecutionEvent::RunStarted {
            alias,
            device_id: self.device_id.clone(),
        })
        .await?;

        if let Some(device_id) = self.device_id.clone() {
            let status = probe_device(&*self.probe, &device_id).await;
            self.emit(ExecutionEvent::DeviceProbed {
                device_id,
                is_rooted: status.is_rooted,
                has_writable_overlay: status.has_writable_overlay,
            })
            .await?;
        }
        if let Some(monitor) = &self.monitor {
            monitor.refresh_now();
        }

        let request = Arc::clone(&self.request);
        let mut failed = false;
        for (index, record) in request.steps.iter().enumerate() {
            self.check_cancelled()?;

            let step = match record.parse() {
                Ok(step) => step,
                Err(e) => {
                    warn!("Run {} step {}: {}", self.run_id, index, e);
                    let reason = match e {
                        StepError::UnknownKind(kind) => SkipReason::UnknownStepType(kind),
                        other => SkipReason::InvalidStep(other.to_string()),
                    };
                    self.emit(ExecutionEvent::StepSkipped { index, reason })
                        .await?;
                    continue;
                }
            };

            if let Some(false) = self.run_step(index, &step).await? {
                failed = true;
            }
        }

        Ok(if failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        })
    }

    /// `Some(success)` for an executed step, `None` for a skipped one
    async fn run_step(&mut self, index: usize, step: &Step) -> Flow<Option<bool>> {
        match step {
            Step::ShellCommand { text } => {
                self.emit(ExecutionEvent::StepStarted {
                    index,
                    description: step.describe(),
                })
                .await?;
                self.run_command(index, CommandLine::shell(text.clone()))
                    .await
                    .map(Some)
            }

            Step::DeviceCommand {
                text,
                uses_local_dir,
            } => {
                let local_dir = if step.needs_local_dir() {
                    match self.pick_directory(index, text).await? {
                        Some(dir) => Some(dir),
                        None => {
                            info!(
                                "Run {} step {}: no directory selected, skipping",
                                self.run_id, index
                            );
                            self.emit(ExecutionEvent::StepSkipped {
                                index,
                                reason: SkipReason::DirectoryNotSelected,
                            })
                            .await?;
                            return Ok(None);
                        }
                    }
                } else {
                    None
                };

                let command = render_command(
                    text,
                    self.device_id.as_deref(),
                    *uses_local_dir,
                    local_dir.as_deref(),
                );
                self.emit(ExecutionEvent::StepStarted {
                    index,
                    description: command.clone(),
                })
                .await?;
                self.run_command(index, CommandLine::shell(command))
                    .await
                    .map(Some)
            }

            Step::Delay { duration_ms } => {
                self.emit(ExecutionEvent::StepStarted {
                    index,
                    description: step.describe(),
                })
                .await?;
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(*duration_ms)) => {}
                    _ = wait_cancelled(&mut self.cancel_rx) => return Err(Cancelled),
                }
                self.emit(ExecutionEvent::StepCompleted {
                    index,
                    exit_code: None,
                    success: true,
                })
                .await?;
                Ok(Some(true))
            }
        }
    }

    async fn pick_directory(&mut self, index: usize, text: &str) -> Flow<Option<String>> {
        let request = PickRequest {
            alias: self.request.alias.clone(),
            step_index: index,
            command: substitute_device(text, self.device_id.as_deref()),
        };

        let picked = tokio::select! {
            picked = self.picker.pick_directory(&request) => picked,
            _ = wait_cancelled(&mut self.cancel_rx) => return Err(Cancelled),
        };
        Ok(picked.map(|dir| dir.to_string_lossy().into_owned()))
    }

    /// Run one command to exit, forwarding its output; returns success
    async fn run_command(&mut self, index: usize, command_line: CommandLine) -> Flow<bool> {
        debug!("Run {} step {}: {}", self.run_id, index, command_line);
        let mut stream = self.runner.run(&command_line);

        loop {
            let event = tokio::select! {
                event = stream.next() => event,
                _ = wait_cancelled(&mut self.cancel_rx) => {
                    stream.kill();
                    return Err(Cancelled);
                }
            };

            match event {
                Some(ProcessEvent::Output { text, is_error }) => {
                    self.emit(ExecutionEvent::OutputLine {
                        index,
                        text,
                        is_error,
                    })
                    .await?;
                }
                Some(ProcessEvent::Exited { code }) => {
                    let success = code == Some(0);
                    if !success {
                        warn!(
                            "Run {} step {} exited with {:?}",
                            self.run_id, index, code
                        );
                    }
                    self.emit(ExecutionEvent::StepCompleted {
                        index,
                        exit_code: code,
                        success,
                    })
                    .await?;
                    return Ok(success);
                }
                None => {
                    warn!("Run {} step {}: output ended without exit", self.run_id, index);
                    self.emit(ExecutionEvent::StepCompleted {
                        index,
                        exit_code: None,
                        success: false,
                    })
                    .await?;
                    return Ok(false);
                }
            }
        }
    }

    fn check_cancelled(&self) -> Flow {
        let cancellers_gone = self.cancel_rx.has_changed().is_err();
        if cancellers_gone || *self.cancel_rx.borrow() || self.events.is_closed() {
            debug!("Run {} cancelled", self.run_id);
            return Err(Cancelled);
        }
        Ok(())
    }

    async fn emit(&self, event: ExecutionEvent) -> Flow {
        trace!("Run {} event: {}", self.run_id, event.event_type());
        self.events.send(event).await.map_err(|_| Cancelled)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::picker::{FixedDirectory, NoDirectory};
    use devdeck_core::StepRecord;
    use devdeck_device::test_utils::{test_device, FakeProbe};
    use devdeck_device::HostShell;
    use tokio::time::timeout;

    fn engine<D>(picker: D) -> ExecutionEngine<FakeProbe, D>
    where
        D: DirectoryPicker + Sync + 'static,
    {
        let probe = FakeProbe::new(vec![test_device("emu-1")]).with_rooted(&["emu-1"]);
        ExecutionEngine::new(Arc::new(probe), Arc::new(picker))
    }

    async fn events_of(mut handle: RunHandle) -> Vec<ExecutionEvent> {
        let mut events = Vec::new();
        while let Some(event) = timeout(Duration::from_secs(10), handle.next_event())
            .await
            .expect("run should make progress")
        {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_event_order_and_failure_does_not_abort() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "mixed",
            vec![
                StepRecord::shell("echo hi"),
                StepRecord::delay(100),
                StepRecord::shell("exit 1"),
            ],
        ));

        let events = events_of(engine.execute(request, None).unwrap()).await;

        assert_eq!(
            events,
            vec![
                ExecutionEvent::RunQueued {
                    alias: "mixed".into()
                },
                ExecutionEvent::RunStarted {
                    alias: "mixed".into(),
                    device_id: None
                },
                ExecutionEvent::StepStarted {
                    index: 0,
                    description: "echo hi".into()
                },
                ExecutionEvent::OutputLine {
                    index: 0,
                    text: "hi".into(),
                    is_error: false
                },
                ExecutionEvent::StepCompleted {
                    index: 0,
                    exit_code: Some(0),
                    success: true
                },
                ExecutionEvent::StepStarted {
                    index: 1,
                    description: "delay 100ms".into()
                },
                ExecutionEvent::StepCompleted {
                    index: 1,
                    exit_code: None,
                    success: true
                },
                ExecutionEvent::StepStarted {
                    index: 2,
                    description: "exit 1".into()
                },
                ExecutionEvent::StepCompleted {
                    index: 2,
                    exit_code: Some(1),
                    success: false
                },
                ExecutionEvent::RunCompleted {
                    alias: "mixed".into(),
                    status: RunStatus::Failed
                },
            ]
        );
        assert!(engine.gate().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_device_command_substitutes_and_probes() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine(FixedDirectory::new(dir.path()));
        let request = Arc::new(Request::new(
            "pull",
            vec![StepRecord::device("echo {dev} {local_dir}", true)],
        ));

        let run = engine
            .execute(request, Some("emu-1".into()))
            .unwrap()
            .collect()
            .await;

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(run.device_id.as_deref(), Some("emu-1"));
        assert_eq!(
            run.steps[0].lines[0].text,
            format!("emu-1 {}", dir.path().display())
        );
    }

    #[tokio::test]
    async fn test_device_probed_event_reports_flags() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "who",
            vec![StepRecord::device("echo {dev}", false)],
        ));

        let events = events_of(engine.execute(request, Some("emu-1".into())).unwrap()).await;

        assert!(events.contains(&ExecutionEvent::DeviceProbed {
            device_id: "emu-1".into(),
            is_rooted: true,
            has_writable_overlay: false,
        }));
    }

    #[tokio::test]
    async fn test_picker_cancel_skips_step_and_continues() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "pull",
            vec![
                StepRecord::device("echo {local_dir}", true),
                StepRecord::shell("echo after"),
            ],
        ));

        let events = events_of(engine.execute(request, Some("emu-1".into())).unwrap()).await;

        assert!(events.contains(&ExecutionEvent::StepSkipped {
            index: 0,
            reason: SkipReason::DirectoryNotSelected,
        }));
        assert!(events.contains(&ExecutionEvent::OutputLine {
            index: 1,
            text: "after".into(),
            is_error: false,
        }));
        assert_eq!(
            events.last(),
            Some(&ExecutionEvent::RunCompleted {
                alias: "pull".into(),
                status: RunStatus::Succeeded,
            })
        );
    }

    #[tokio::test]
    async fn test_local_dir_left_verbatim_without_opt_in() {
        let engine = engine(FixedDirectory::new("/should/not/appear"));
        let request = Arc::new(Request::new(
            "raw",
            vec![StepRecord::device("echo '{local_dir}'", false)],
        ));

        let run = engine
            .execute(request, Some("emu-1".into()))
            .unwrap()
            .collect()
            .await;
        assert_eq!(run.steps[0].lines[0].text, "{local_dir}");
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_steps_are_skipped() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "odd",
            vec![
                StepRecord {
                    kind: "script".into(),
                    value: "print(1)".into(),
                    local_dir: None,
                },
                StepRecord {
                    kind: "delay".into(),
                    value: "soon".into(),
                    local_dir: None,
                },
                StepRecord::shell("echo ok"),
            ],
        ));

        let run = engine.execute(request, None).unwrap().collect().await;

        assert_eq!(run.status, RunStatus::Succeeded);
        assert_eq!(
            run.steps[0].skipped,
            Some(SkipReason::UnknownStepType("script".into()))
        );
        assert!(matches!(
            run.steps[1].skipped,
            Some(SkipReason::InvalidStep(_))
        ));
        assert_eq!(run.steps[2].lines[0].text, "ok");
    }

    #[tokio::test]
    async fn test_device_request_without_device_is_rejected() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "needs-device",
            vec![StepRecord::device("adb -s {dev} reboot", false)],
        ));

        let err = engine.execute(Arc::clone(&request), None).unwrap_err();
        assert!(matches!(err, Error::NoDeviceSelected { .. }));

        let err = engine.execute(request, Some("  ".into())).unwrap_err();
        assert!(matches!(err, Error::NoDeviceSelected { .. }));
        assert!(engine.gate().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_runs_are_single_flight_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("order.log");
        let engine = engine(NoDirectory);

        let handles: Vec<_> = (1..=3)
            .map(|n| {
                let line = format!(
                    "echo start-{n} >> '{log}'; sleep 0.1; echo end-{n} >> '{log}'",
                    n = n,
                    log = log.display()
                );
                let request = Arc::new(Request::new(
                    format!("r{}", n),
                    vec![StepRecord::shell(line)],
                ));
                engine.execute(request, None).unwrap()
            })
            .collect();

        let snapshot = engine.gate().snapshot();
        assert_eq!(snapshot.active.as_deref(), Some("r1"));
        assert_eq!(snapshot.waiting, vec!["r2".to_string(), "r3".to_string()]);

        for handle in handles {
            let run = handle.collect().await;
            assert_eq!(run.status, RunStatus::Succeeded);
        }

        let order = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<_> = order.lines().collect();
        assert_eq!(
            lines,
            vec!["start-1", "end-1", "start-2", "end-2", "start-3", "end-3"]
        );
        assert!(engine.gate().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_cancel_during_delay() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "slow",
            vec![StepRecord::delay(60_000), StepRecord::shell("echo never")],
        ));

        let mut handle = engine.execute(request, None).unwrap();
        loop {
            match handle.next_event().await {
                Some(ExecutionEvent::StepStarted { index: 0, .. }) => break,
                Some(_) => continue,
                None => panic!("run ended early"),
            }
        }
        handle.cancel();

        let rest = events_of(handle).await;
        assert_eq!(
            rest,
            vec![ExecutionEvent::RunCompleted {
                alias: "slow".into(),
                status: RunStatus::Cancelled,
            }]
        );
        assert!(engine.gate().snapshot().is_idle());
    }

    #[tokio::test]
    async fn test_cancel_kills_running_command() {
        let engine = engine(NoDirectory);
        let request = Arc::new(Request::new(
            "hang",
            vec![StepRecord::shell("echo ready; exec sleep 60")],
        ));

        let mut handle = engine.execute(request, None).unwrap();
        loop {
            match handle.next_event().await {
                Some(ExecutionEvent::OutputLine { .. }) => break,
                Some(_) => continue,
                None => panic!("run ended early"),
            }
        }
        handle.cancel();

        let rest = events_of(handle).await;
        assert_eq!(
            rest.last(),
            Some(&ExecutionEvent::RunCompleted {
                alias: "hang".into(),
                status: RunStatus::Cancelled,
            })
        );
    }

    #[tokio::test]
    async fn test_cancel_while_queued_leaves_queue() {
        let engine = engine(NoDirectory);
        let blocker = engine
            .execute(
                Arc::new(Request::new("blocker", vec![StepRecord::delay(60_000)])),
                None,
            )
            .unwrap();
        let queued = engine
            .execute(
                Arc::new(Request::new("queued", vec![StepRecord::shell("echo x")])),
                None,
            )
            .unwrap();

        queued.cancel();
        let events = events_of(queued).await;
        assert_eq!(
            events,
            vec![
                ExecutionEvent::RunQueued {
                    alias: "queued".into()
                },
                ExecutionEvent::RunCompleted {
                    alias: "queued".into(),
                    status: RunStatus::Cancelled
                },
            ]
        );
        assert!(engine.gate().snapshot().waiting.is_empty());

        blocker.cancel();
        let run = timeout(Duration::from_secs(5), blocker.collect())
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_gate() {
        let engine = engine(NoDirectory);
        let first = engine
            .execute(
                Arc::new(Request::new("abandoned", vec![StepRecord::delay(60_000)])),
                None,
            )
            .unwrap();
        let second = engine
            .execute(
                Arc::new(Request::new("next", vec![StepRecord::shell("echo next")])),
                None,
            )
            .unwrap();

        drop(first);

        let run = timeout(Duration::from_secs(5), second.collect())
            .await
            .expect("second run should start after the first is dropped");
        assert_eq!(run.status, RunStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_launch_failure_is_a_failed_step() {
        let engine = engine(NoDirectory).with_runner(ProcessRunner::new(HostShell::new(
            "devdeck-no-such-shell",
            vec!["-c".into()],
        )));
        let request = Arc::new(Request::new("broken", vec![StepRecord::shell("echo hi")]));

        let run = engine.execute(request, None).unwrap().collect().await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.steps[0].exit_code, Some(devdeck_device::LAUNCH_FAILURE_CODE));
        assert!(run.steps[0].lines[0].is_error);
    }

    #[tokio::test]
    async fn test_run_requests_monitor_refresh() {
        use devdeck_device::{DeviceMonitor, MonitorConfig};

        let probe = Arc::new(FakeProbe::new(vec![test_device("emu-1")]));
        let (monitor, monitor_task) =
            DeviceMonitor::spawn(Arc::clone(&probe), MonitorConfig::default());
        let mut changes = monitor.subscribe();

        let engine = ExecutionEngine::new(Arc::clone(&probe), Arc::new(NoDirectory))
            .with_monitor(monitor.clone());
        let request = Arc::new(Request::new("r", vec![StepRecord::shell("true")]));
        engine.execute(request, None).unwrap().collect().await;

        let change = timeout(Duration::from_secs(5), changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(change.devices.len(), 1);

        monitor.shutdown();
        monitor_task.await.unwrap();
    }
}
