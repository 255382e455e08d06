//! External process runner
//!
//! Every command the system executes, probes included, goes through
//! [`ProcessRunner`]. A run never fails with an `Err`: launch failures are
//! reported in-band as an error line followed by
//! `Exited { code: Some(LAUNCH_FAILURE_CODE) }`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use devdeck_core::prelude::*;
use devdeck_core::ProcessEvent;

/// Exit code reported when the command could not be started at all
pub const LAUNCH_FAILURE_CODE: i32 = -1;

/// Buffered events per running process
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long to wait for the output readers after the child exited.
/// A grandchild that inherited the pipes can keep them open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A full command line interpreted by the host shell
    Shell(String),

    /// Direct exec without a shell
    Program { program: String, args: Vec<String> },
}

impl CommandLine {
    pub fn shell(line: impl Into<String>) -> Self {
        CommandLine::Shell(line.into())
    }

    pub fn program<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandLine::Program {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandLine::Shell(line) => f.write_str(line),
            CommandLine::Program { program, args } if args.is_empty() => f.write_str(program),
            CommandLine::Program { program, args } => write!(f, "{} {}", program, args.join(" ")),
        }
    }
}

/// Host shell used for [`CommandLine::Shell`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostShell {
    pub program: String,
    /// Arguments placed before the command line (`-c`, `/C`)
    pub args: Vec<String>,
}

impl HostShell {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for HostShell {
    /// Switches the console to UTF-8 before the command so output decodes
    #[cfg(windows)]
    fn default() -> Self {
        Self::new(
            "cmd",
            ["/C", "chcp", "65001", ">nul", "&&"]
                .into_iter()
                .map(String::from)
                .collect(),
        )
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self::new("sh", vec!["-c".to_string()])
    }
}

/// Collected output of a command run to completion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Launches external commands
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    shell: HostShell,
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(shell: HostShell) -> Self {
        Self {
            shell,
            working_dir: None,
        }
    }

    /// Run every command in `dir` (ignored when `None`)
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    pub fn shell(&self) -> &HostShell {
        &self.shell
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn build_command(&self, command_line: &CommandLine) -> Command {
        let mut command = match command_line {
            CommandLine::Shell(line) => {
                let mut command = Command::new(&self.shell.program);
                command.args(&self.shell.args);
                // cmd.exe does its own parsing; quoting the line would break it
                #[cfg(windows)]
                command.raw_arg(line);
                #[cfg(not(windows))]
                command.arg(line);
                command
            }
            CommandLine::Program { program, args } => {
                let mut command = Command::new(program);
                command.args(args);
                command
            }
        };

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }

    /// Start `command_line` and stream its output
    ///
    /// Must be called from within a tokio runtime.
    pub fn run(&self, command_line: &CommandLine) -> ProcessStream {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let exited = Arc::new(AtomicBool::new(false));

        let mut command = self.build_command(command_line);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!("Failed to launch '{}': {}", command_line, e);
                exited.store(true, Ordering::Release);
                // Fresh channel with spare capacity: both sends succeed.
                let _ = event_tx.try_send(ProcessEvent::Output {
                    text: format!("Failed to launch '{}': {}", command_line, e),
                    is_error: true,
                });
                let _ = event_tx.try_send(ProcessEvent::Exited {
                    code: Some(LAUNCH_FAILURE_CODE),
                });
                return ProcessStream {
                    rx: event_rx,
                    pid: None,
                    kill_tx: None,
                    exited,
                };
            }
        };

        let pid = child.id();
        debug!("Started '{}' (pid {:?})", command_line, pid);

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(read_lines(stdout, event_tx.clone(), false)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(read_lines(stderr, event_tx.clone(), true)));
        }

        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        tokio::spawn(wait_for_exit(
            child,
            kill_rx,
            readers,
            event_tx,
            Arc::clone(&exited),
        ));

        ProcessStream {
            rx: event_rx,
            pid,
            kill_tx: Some(kill_tx),
            exited,
        }
    }

    /// Run `command_line` to completion and collect its output
    ///
    /// Unlike [`run`](Self::run), spawn failures and timeouts are errors.
    pub async fn capture(
        &self,
        command_line: &CommandLine,
        limit: Duration,
    ) -> Result<CapturedOutput> {
        let mut command = self.build_command(command_line);
        command.stdin(Stdio::null()).kill_on_drop(true);

        let output = tokio::time::timeout(limit, command.output())
            .await
            .map_err(|_| {
                Error::process(format!("'{}' timed out after {:?}", command_line, limit))
            })?
            .map_err(|e| {
                let program = match command_line {
                    CommandLine::Shell(_) => self.shell.program.clone(),
                    CommandLine::Program { program, .. } => program.clone(),
                };
                Error::process_spawn(program, e.to_string())
            })?;

        Ok(CapturedOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        })
    }
}

/// Forward non-empty lines until EOF or until the receiver is gone.
///
/// Invalid UTF-8 is replaced rather than ending the stream.
async fn read_lines<R>(reader: R, tx: mpsc::Sender<ProcessEvent>, is_error: bool)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Output reader error: {}", e);
                break;
            }
        }

        let line = String::from_utf8_lossy(&buf);
        let line = line.trim_end_matches(['\n', '\r']);
        if line.is_empty() {
            continue;
        }
        trace!("{}: {}", if is_error { "stderr" } else { "stdout" }, line);

        let event = ProcessEvent::Output {
            text: line.to_string(),
            is_error,
        };
        if tx.send(event).await.is_err() {
            debug!("Output channel closed");
            break;
        }
    }
}

/// Owns `child`; waits for exit (or kills on request), drains the readers,
/// then sends `Exited` as the final event.
async fn wait_for_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    readers: Vec<JoinHandle<()>>,
    event_tx: mpsc::Sender<ProcessEvent>,
    exited: Arc<AtomicBool>,
) {
    let code: Option<i32> = tokio::select! {
        result = child.wait() => {
            match result {
                Ok(status) => {
                    debug!("Process exited with status: {:?}", status);
                    status.code()
                }
                Err(e) => {
                    error!("Error waiting for process: {}", e);
                    None
                }
            }
        }
        _ = kill_rx => {
            debug!("Kill requested, terminating process");
            if let Err(e) = child.kill().await {
                warn!("Failed to kill process: {}", e);
            }
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    error!("Error waiting after kill: {}", e);
                    None
                }
            }
        }
    };

    for mut reader in readers {
        if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
            .await
            .is_err()
        {
            warn!("Output reader did not finish after exit; dropping remaining output");
            reader.abort();
        }
    }

    exited.store(true, Ordering::Release);
    let _ = event_tx.send(ProcessEvent::Exited { code }).await;
}

/// Handle to one running (or finished) child process
///
/// Dropping the stream before the child exits kills it.
pub struct ProcessStream {
    rx: mpsc::Receiver<ProcessEvent>,
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: Arc<AtomicBool>,
}

impl ProcessStream {
    /// Next event; `None` after `Exited` has been delivered
    pub async fn next(&mut self) -> Option<ProcessEvent> {
        self.rx.recv().await
    }

    /// Process ID, `None` if the launch failed
    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Request termination; `Exited` still follows
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Consume the stream and collect everything up to exit
    pub async fn wait(mut self) -> CapturedOutput {
        let mut captured = CapturedOutput::default();
        while let Some(event) = self.next().await {
            match event {
                ProcessEvent::Output { text, is_error } => {
                    let target = if is_error {
                        &mut captured.stderr
                    } else {
                        &mut captured.stdout
                    };
                    target.push_str(&text);
                    target.push('\n');
                }
                ProcessEvent::Exited { code } => {
                    captured.code = code;
                    break;
                }
            }
        }
        captured
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        if !self.has_exited() {
            debug!("ProcessStream dropped while process may still be running");
            self.kill();
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn collect(mut stream: ProcessStream) -> Vec<ProcessEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_run_streams_lines_then_exit() {
        let runner = ProcessRunner::default();
        let events = collect(runner.run(&CommandLine::shell("echo one; echo two"))).await;

        assert_eq!(
            events,
            vec![
                ProcessEvent::Output {
                    text: "one".into(),
                    is_error: false
                },
                ProcessEvent::Output {
                    text: "two".into(),
                    is_error: false
                },
                ProcessEvent::Exited { code: Some(0) },
            ]
        );
    }

    #[tokio::test]
    async fn test_stderr_is_flagged() {
        let runner = ProcessRunner::default();
        let events = collect(runner.run(&CommandLine::shell("echo oops >&2; exit 3"))).await;

        assert_eq!(
            events,
            vec![
                ProcessEvent::Output {
                    text: "oops".into(),
                    is_error: true
                },
                ProcessEvent::Exited { code: Some(3) },
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_lines_are_skipped() {
        let runner = ProcessRunner::default();
        let captured = runner
            .run(&CommandLine::shell("printf 'a\\n\\nb\\n'"))
            .wait()
            .await;
        assert_eq!(captured.stdout, "a\nb\n");
        assert!(captured.success());
    }

    #[tokio::test]
    async fn test_output_without_trailing_newline() {
        let runner = ProcessRunner::default();
        let captured = runner.run(&CommandLine::shell("printf tail")).wait().await;
        assert_eq!(captured.stdout, "tail\n");
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_in_band() {
        let runner = ProcessRunner::default();
        let mut stream = runner.run(&CommandLine::program(
            "devdeck-definitely-not-a-real-binary",
            Vec::<String>::new(),
        ));
        assert!(stream.id().is_none());
        assert!(stream.has_exited());

        match stream.next().await {
            Some(ProcessEvent::Output { text, is_error }) => {
                assert!(is_error);
                assert!(text.contains("devdeck-definitely-not-a-real-binary"));
            }
            other => panic!("expected error output, got {:?}", other),
        }
        assert_eq!(
            stream.next().await,
            Some(ProcessEvent::Exited {
                code: Some(LAUNCH_FAILURE_CODE)
            })
        );
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_kill_ends_long_running_process() {
        let runner = ProcessRunner::default();
        let mut stream = runner.run(&CommandLine::shell("sleep 30"));
        assert!(stream.id().is_some());

        stream.kill();
        let exit = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match stream.next().await {
                    Some(ProcessEvent::Exited { code }) => return code,
                    Some(_) => continue,
                    None => panic!("stream ended without Exited"),
                }
            }
        })
        .await
        .expect("process should exit after kill");

        assert_ne!(exit, Some(0));
        assert!(stream.has_exited());
    }

    #[tokio::test]
    async fn test_working_dir_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let runner = ProcessRunner::default().with_working_dir(Some(dir.path().to_path_buf()));
        let captured = runner.run(&CommandLine::shell("ls")).wait().await;
        assert!(captured.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_capture_collects_output() {
        let runner = ProcessRunner::default();
        let captured = runner
            .capture(
                &CommandLine::program("sh", ["-c", "echo hello; echo err >&2"]),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(captured.stdout, "hello\n");
        assert_eq!(captured.stderr, "err\n");
        assert!(captured.success());
    }

    #[tokio::test]
    async fn test_capture_times_out() {
        let runner = ProcessRunner::default();
        let result = runner
            .capture(&CommandLine::shell("sleep 5"), Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Process { .. })));
    }

    #[tokio::test]
    async fn test_capture_spawn_failure_is_error() {
        let runner = ProcessRunner::default();
        let result = runner
            .capture(
                &CommandLine::program("devdeck-definitely-not-a-real-binary", ["x"]),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(Error::ProcessSpawn { .. })));
    }

    #[test]
    fn test_command_line_display() {
        assert_eq!(CommandLine::shell("echo hi").to_string(), "echo hi");
        assert_eq!(
            CommandLine::program("adb", ["-s", "abc", "shell", "id"]).to_string(),
            "adb -s abc shell id"
        );
    }
}
