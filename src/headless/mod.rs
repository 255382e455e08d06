//! Headless output - NDJSON events on stdout
//!
//! With `--json`, every command prints newline-delimited JSON instead of
//! human-readable lines, one object per line. Each object has an `event`
//! field naming its type and a millisecond `timestamp`.
//!
//! # Example Output
//!
//! ```json
//! {"event":"device_list","devices":[...],"added":["emulator-5554"],"removed":[],"timestamp":1704700001000}
//! {"run_id":1,"timestamp":1704700002000,"event":"step_started","index":0,"description":"echo hi"}
//! {"run_id":1,"timestamp":1704700002010,"event":"output_line","index":0,"text":"hi","is_error":false}
//! ```
//!
//! Run events carry the engine's [`ExecutionEvent`] fields unchanged, tagged
//! with the run id.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::io::{self, Write};
use tracing::error;

use devdeck_core::{Device, DeviceListChange, ExecutionEvent, StepRecord};

/// Non-run events emitted in headless mode
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HeadlessEvent {
    /// Current device list, after a probe
    DeviceList {
        devices: Vec<Device>,
        added: Vec<String>,
        removed: Vec<String>,
        timestamp: i64,
    },

    /// A saved request
    Request {
        alias: String,
        steps: Vec<StepRecord>,
        timestamp: i64,
    },

    /// One run history entry
    History {
        alias: String,
        steps: Vec<StepRecord>,
        execute_time: DateTime<Local>,
        timestamp: i64,
    },

    /// Informational message (saved, removed, work dir changes)
    Info { message: String, timestamp: i64 },

    /// Error occurred
    Error {
        message: String,
        fatal: bool,
        timestamp: i64,
    },
}

/// A run event tagged with its run
#[derive(Debug, Serialize)]
pub struct RunEvent<'a> {
    pub run_id: u64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub event: &'a ExecutionEvent,
}

impl<'a> RunEvent<'a> {
    pub fn new(run_id: u64, event: &'a ExecutionEvent) -> Self {
        Self {
            run_id,
            timestamp: now(),
            event,
        }
    }

    pub fn emit(&self) {
        write_line(self);
    }
}

impl HeadlessEvent {
    /// Emit this event to stdout as JSON
    pub fn emit(&self) {
        write_line(self);
    }

    // ─────────────────────────────────────────────────────────
    // Convenience constructors
    // ─────────────────────────────────────────────────────────

    pub fn device_list(change: &DeviceListChange) -> Self {
        Self::DeviceList {
            devices: change.devices.clone(),
            added: change.added.clone(),
            removed: change.removed.clone(),
            timestamp: now(),
        }
    }

    pub fn request(alias: &str, steps: &[StepRecord]) -> Self {
        Self::Request {
            alias: alias.to_string(),
            steps: steps.to_vec(),
            timestamp: now(),
        }
    }

    pub fn history(alias: &str, steps: &[StepRecord], execute_time: DateTime<Local>) -> Self {
        Self::History {
            alias: alias.to_string(),
            steps: steps.to_vec(),
            execute_time,
            timestamp: now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
            timestamp: now(),
        }
    }

    pub fn error(message: String, fatal: bool) -> Self {
        Self::Error {
            message,
            fatal,
            timestamp: now(),
        }
    }
}

/// Current timestamp in milliseconds
fn now() -> i64 {
    Utc::now().timestamp_millis()
}

fn write_line<T: Serialize>(value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize headless event: {}", e);
            return;
        }
    };

    // NDJSON: one object per line
    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", json) {
        error!("Failed to write headless event to stdout: {}", e);
        return;
    }

    // Flush so consumers see each event immediately
    if let Err(e) = stdout.flush() {
        error!("Failed to flush headless stdout: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devdeck_core::{RunStatus, SkipReason};
    use devdeck_device::test_utils::test_device_full;

    #[test]
    fn test_device_list_serialization() {
        let change = DeviceListChange {
            devices: vec![test_device_full("emu-1", "device", true, false)],
            added: vec!["emu-1".into()],
            removed: vec![],
        };
        let json = serde_json::to_string(&HeadlessEvent::device_list(&change))
            .expect("serialization failed");
        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["event"], "device_list");
        assert_eq!(value["devices"][0]["id"], "emu-1");
        assert_eq!(value["devices"][0]["is_rooted"], true);
        assert_eq!(value["added"][0], "emu-1");
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_run_event_flattens_execution_event() {
        let event = ExecutionEvent::StepStarted {
            index: 0,
            description: "echo hi".into(),
        };
        let json = serde_json::to_string(&RunEvent::new(7, &event)).expect("serialization failed");
        let value: serde_json::Value = serde_json::from_str(&json).expect("invalid JSON");

        assert_eq!(value["run_id"], 7);
        assert_eq!(value["event"], "step_started");
        assert_eq!(value["index"], 0);
        assert_eq!(value["description"], "echo hi");
        assert!(value["timestamp"].is_number());
    }

    #[test]
    fn test_run_completed_and_skip_serialization() {
        let completed = ExecutionEvent::RunCompleted {
            alias: "pull".into(),
            status: RunStatus::Cancelled,
        };
        let value = serde_json::to_value(RunEvent::new(1, &completed)).unwrap();
        assert_eq!(value["event"], "run_completed");
        assert_eq!(value["status"], "cancelled");

        let skipped = ExecutionEvent::StepSkipped {
            index: 2,
            reason: SkipReason::UnknownStepType("script".into()),
        };
        let value = serde_json::to_value(RunEvent::new(1, &skipped)).unwrap();
        assert_eq!(value["event"], "step_skipped");
        assert_eq!(value["reason"]["kind"], "unknown_step_type");
        assert_eq!(value["reason"]["detail"], "script");
    }

    #[test]
    fn test_error_serialization() {
        let value =
            serde_json::to_value(HeadlessEvent::error("No device selected".into(), false)).unwrap();
        assert_eq!(value["event"], "error");
        assert_eq!(value["message"], "No device selected");
        assert_eq!(value["fatal"], false);
    }
}
