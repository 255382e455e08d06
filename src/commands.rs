//! Subcommand implementations
//!
//! Each command loads what it needs from the config directory, does its work
//! through the library crates, and reports through a [`Reporter`] that
//! prints either console lines or NDJSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tokio::sync::broadcast::error::RecvError;

use devdeck_app::config::{init_config_dir, load_settings, Settings};
use devdeck_app::{
    DirectoryPicker, ExecutionEngine, FixedDirectory, HistoryEntry, NoDirectory, PickRequest,
    PromptDirectory, RequestBook, RunHandle, Store,
};
use devdeck_core::prelude::*;
use devdeck_core::{resolve_selection, Device, DeviceListChange, ExecutionEvent, Request, RunStatus};
use devdeck_device::{
    locate_bridge, DeviceMonitor, HotplugWatcher, MonitorHandle, ProcessRunner,
};

use crate::cli::{Cli, Command};
use crate::console;
use crate::headless::{HeadlessEvent, RunEvent};

/// Prints command results in the selected output mode
#[derive(Debug, Clone, Copy)]
pub struct Reporter {
    json: bool,
}

impl Reporter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }

    pub fn is_json(&self) -> bool {
        self.json
    }

    pub fn devices(&self, change: &DeviceListChange) {
        if self.json {
            HeadlessEvent::device_list(change).emit();
        } else {
            print_lines(console::format_device_list(&change.devices));
        }
    }

    pub fn device_change(&self, change: &DeviceListChange) {
        if self.json {
            HeadlessEvent::device_list(change).emit();
        } else {
            print_lines(console::format_device_change(change));
            println!();
        }
    }

    pub fn request(&self, request: &Request) {
        if self.json {
            HeadlessEvent::request(&request.alias, &request.steps).emit();
        } else {
            print_lines(console::format_request(request));
        }
    }

    pub fn history(&self, entry: &HistoryEntry) {
        if self.json {
            HeadlessEvent::history(&entry.alias, &entry.steps, entry.execute_time).emit();
        } else {
            println!("{}", console::format_history_entry(entry));
        }
    }

    pub fn run_event(&self, run_id: u64, event: &ExecutionEvent) {
        if self.json {
            RunEvent::new(run_id, event).emit();
        } else if let Some(line) = console::format_event(event) {
            println!("{}", line);
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let message = message.into();
        if self.json {
            HeadlessEvent::info(message).emit();
        } else {
            println!("{}", message);
        }
    }

    pub fn error(&self, error: &Error) {
        if self.json {
            HeadlessEvent::error(error.to_string(), error.is_fatal()).emit();
        } else {
            eprintln!("Error: {}", error);
        }
    }
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

/// Directory picker selected on the command line
#[derive(Debug, Clone)]
pub enum CliPicker {
    Fixed(FixedDirectory),
    Prompt(PromptDirectory),
    Decline(NoDirectory),
}

impl CliPicker {
    /// `--local-dir` wins, then `--no-prompt`; otherwise prompt when stdin
    /// is a terminal and decline when it is not
    ///
    /// A relative `--local-dir` is resolved against the current directory,
    /// not the work dir the commands later run in.
    pub fn select(
        local_dir: Option<PathBuf>,
        no_prompt: bool,
        interactive: bool,
    ) -> Result<Self> {
        Ok(match local_dir {
            Some(dir) => Self::Fixed(FixedDirectory::new(resolve_local_dir(&dir)?)),
            None if no_prompt || !interactive => Self::Decline(NoDirectory),
            None => Self::Prompt(PromptDirectory),
        })
    }
}

/// Canonical absolute form of a `--local-dir` argument
fn resolve_local_dir(dir: &Path) -> Result<PathBuf> {
    let resolved = dunce::canonicalize(dir).map_err(|e| {
        Error::config(format!("Cannot use local dir {}: {}", dir.display(), e))
    })?;
    if !resolved.is_dir() {
        return Err(Error::config(format!(
            "Local dir {} is not a directory",
            resolved.display()
        )));
    }
    Ok(resolved)
}

impl DirectoryPicker for CliPicker {
    async fn pick_directory(&self, request: &PickRequest) -> Option<PathBuf> {
        match self {
            Self::Fixed(picker) => picker.pick_directory(request).await,
            Self::Prompt(picker) => picker.pick_directory(request).await,
            Self::Decline(picker) => picker.pick_directory(request).await,
        }
    }
}

/// Run one parsed command line
///
/// Returns `Ok(false)` when every step ran but some run did not succeed.
pub async fn run_cli(cli: Cli) -> Result<bool> {
    let config_dir = cli
        .config_dir
        .clone()
        .unwrap_or_else(devdeck_app::config::default_config_dir);
    let settings = load_settings(&config_dir);
    let reporter = Reporter::new(cli.json);
    debug!("Config dir: {}", config_dir.display());

    match cli.command {
        Command::Devices => list_devices(&settings, reporter).await?,
        Command::Watch => watch_devices(&settings, reporter).await?,
        Command::List => list_requests(&config_dir, reporter)?,
        Command::Add { alias, steps } => {
            add_request(&config_dir, Request::new(alias, steps), reporter)?
        }
        Command::Remove { alias } => remove_request(&config_dir, &alias, reporter)?,
        Command::Run {
            aliases,
            device,
            local_dir,
            no_prompt,
        } => {
            use std::io::IsTerminal;
            let interactive = std::io::stdin().is_terminal();
            let picker = CliPicker::select(local_dir, no_prompt, interactive)?;
            return run_requests(&settings, &config_dir, &aliases, device, picker, reporter)
                .await;
        }
        Command::History { clear } => show_history(&config_dir, clear, reporter)?,
        Command::Workdir { path, clear } => {
            set_work_dir(&config_dir, path.as_deref(), clear, reporter)?
        }
        Command::Init => {
            let path = init_config_dir(&config_dir)?;
            reporter.info(format!("Config: {}", path.display()));
        }
    }

    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Devices
// ─────────────────────────────────────────────────────────────────────────────

fn spawn_monitor(settings: &Settings) -> Result<(MonitorHandle, tokio::task::JoinHandle<()>)> {
    let bridge = locate_bridge(&settings.bridge.program)?;
    debug!("Using device bridge {}", bridge.display());

    let probe = Arc::new(settings.bridge.probe());
    Ok(DeviceMonitor::spawn(probe, settings.monitor.monitor_config()))
}

/// Trigger a probe and wait for its result
async fn refresh_once(monitor: &MonitorHandle) -> Result<DeviceListChange> {
    let mut changes = monitor.subscribe();
    monitor.refresh_now();
    loop {
        match changes.recv().await {
            Ok(change) => return Ok(change),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return Err(Error::ChannelClosed),
        }
    }
}

async fn list_devices(settings: &Settings, reporter: Reporter) -> Result<()> {
    let (monitor, task) = spawn_monitor(settings)?;
    let change = refresh_once(&monitor).await;
    monitor.shutdown();
    let _ = task.await;

    reporter.devices(&change?);
    Ok(())
}

async fn watch_devices(settings: &Settings, reporter: Reporter) -> Result<()> {
    let (monitor, task) = spawn_monitor(settings)?;
    let mut changes = monitor.subscribe();

    let _watcher = if settings.monitor.watch_hotplug {
        HotplugWatcher::start(&settings.monitor.hotplug_paths, monitor.clone())
            .map_err(|e| warn!("Hotplug watching disabled: {}", e))
            .ok()
    } else {
        info!("Hotplug watching disabled in config");
        None
    };

    monitor.refresh_now();

    let mut shown: Option<Vec<Device>> = None;
    loop {
        tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => {
                    if shown.as_ref() != Some(&change.devices) {
                        reporter.device_change(&change);
                        shown = Some(change.devices);
                    }
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} device list update(s)", missed);
                    monitor.refresh_now();
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted; stopping device watch");
                break;
            }
        }
    }

    monitor.shutdown();
    let _ = task.await;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Saved requests
// ─────────────────────────────────────────────────────────────────────────────

fn open_book(config_dir: &Path) -> Result<RequestBook> {
    RequestBook::open(Store::new(config_dir))
}

fn list_requests(config_dir: &Path, reporter: Reporter) -> Result<()> {
    let book = open_book(config_dir)?;
    if book.requests().is_empty() && !reporter.is_json() {
        println!("No saved requests");
    }
    for request in book.requests() {
        reporter.request(request);
    }
    Ok(())
}

fn add_request(config_dir: &Path, request: Request, reporter: Reporter) -> Result<()> {
    if let Err((index, e)) = request.validate() {
        return Err(Error::invalid_request(format!("step {}: {}", index + 1, e)));
    }

    let mut book = open_book(config_dir)?;
    let alias = request.alias.clone();
    book.add(request)?;
    reporter.info(format!("Saved '{}'", alias));
    Ok(())
}

fn remove_request(config_dir: &Path, alias: &str, reporter: Reporter) -> Result<()> {
    let mut book = open_book(config_dir)?;
    let removed = book.remove(alias)?;
    reporter.info(format!(
        "Removed '{}' ({} step(s))",
        removed.alias,
        removed.steps.len()
    ));
    Ok(())
}

fn show_history(config_dir: &Path, clear: bool, reporter: Reporter) -> Result<()> {
    let store = Store::new(config_dir);
    if clear {
        store.clear_history()?;
        reporter.info("History cleared");
        return Ok(());
    }

    let history = store.load_history()?;
    if history.is_empty() && !reporter.is_json() {
        println!("No history");
    }
    for entry in &history {
        reporter.history(entry);
    }
    Ok(())
}

fn set_work_dir(
    config_dir: &Path,
    path: Option<&Path>,
    clear: bool,
    reporter: Reporter,
) -> Result<()> {
    let mut book = open_book(config_dir)?;

    if clear {
        book.set_work_dir(None)?;
        reporter.info("Work dir: current directory");
        return Ok(());
    }

    if let Some(path) = path {
        if !path.is_dir() {
            return Err(Error::config(format!(
                "Work dir {} is not a directory",
                path.display()
            )));
        }
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        book.set_work_dir(Some(&absolute))?;
    }

    match book.work_dir() {
        Some(dir) => reporter.info(format!("Work dir: {}", dir.display())),
        None => reporter.info("Work dir: current directory"),
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Execution
// ─────────────────────────────────────────────────────────────────────────────

/// Queue every alias, then report each run in order
///
/// Unknown aliases fail before anything runs. Ctrl-C cancels every run.
async fn run_requests<D>(
    settings: &Settings,
    config_dir: &Path,
    aliases: &[String],
    device: Option<String>,
    picker: D,
    reporter: Reporter,
) -> Result<bool>
where
    D: DirectoryPicker + Sync + 'static,
{
    let book = open_book(config_dir)?;
    let requests = aliases
        .iter()
        .map(|alias| book.get(alias).map(|r| Arc::new(r.clone())))
        .collect::<Result<Vec<_>>>()?;

    let probe = Arc::new(settings.bridge.probe());
    let needs_device = requests.iter().any(|r| r.requires_device());
    let (monitor, monitor_task) =
        DeviceMonitor::spawn(Arc::clone(&probe), settings.monitor.monitor_config());

    let device_id = match device {
        Some(id) => Some(id),
        None if needs_device => {
            let change = refresh_once(&monitor).await?;
            let selected = resolve_selection(&change.devices, None);
            if let Some(id) = &selected {
                info!("No device given; using {}", id);
            }
            selected
        }
        None => None,
    };

    let runner = ProcessRunner::new(settings.shell.host_shell()).with_working_dir(book.work_dir());
    let engine = ExecutionEngine::new(probe, Arc::new(picker))
        .with_runner(runner)
        .with_monitor(monitor.clone())
        .with_event_buffer(settings.execution.event_buffer);

    if device_id.is_none() {
        if let Some(request) = requests.iter().find(|r| r.requires_device()) {
            monitor.shutdown();
            let _ = monitor_task.await;
            return Err(Error::no_device_selected(&request.alias));
        }
    }

    // Queue everything up front so the runs keep submission order
    let handles = requests
        .iter()
        .map(|request| {
            engine
                .execute(Arc::clone(request), device_id.clone())
                .map(|handle| (Arc::clone(request), handle))
        })
        .collect::<Result<Vec<_>>>()?;

    let cancellers: Vec<_> = handles.iter().map(|(_, h)| h.canceller()).collect();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling {} run(s)", cancellers.len());
            for canceller in &cancellers {
                canceller.cancel();
            }
        }
    });

    let store = book.store().clone();
    let mut all_succeeded = true;
    for (request, handle) in handles {
        let (status, started_at) = drain_run(handle, reporter).await;
        if let Some(started_at) = started_at {
            let recorded = store
                .add_history(HistoryEntry::for_request(&request, started_at))
                .context("Failed to record run history");
            if recorded.is_err() && !reporter.is_json() {
                eprintln!("Warning: history for '{}' was not saved", request.alias);
            }
        }
        all_succeeded &= status == RunStatus::Succeeded;
    }

    interrupt.abort();
    monitor.shutdown();
    let _ = monitor_task.await;
    Ok(all_succeeded)
}

/// Report every event of one run; returns its final status and start time
async fn drain_run(
    mut handle: RunHandle,
    reporter: Reporter,
) -> (RunStatus, Option<DateTime<Local>>) {
    let run_id = handle.id();
    let mut status = RunStatus::Pending;
    let mut started_at = None;

    while let Some(event) = handle.next_event().await {
        reporter.run_event(run_id, &event);
        match &event {
            ExecutionEvent::RunStarted { .. } => started_at = Some(Local::now()),
            ExecutionEvent::RunCompleted { status: final_status, .. } => status = *final_status,
            _ => {}
        }
    }
    (status, started_at)
}
