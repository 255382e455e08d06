//! Event types shared between the process, monitor and execution layers

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::Device;
use crate::run::RunStatus;

/// Incremental output of one subprocess
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    /// One line of stdout (`is_error == false`) or stderr
    Output { text: String, is_error: bool },

    /// Always the last event; `None` when the process was killed by a signal
    Exited { code: Option<i32> },
}

/// Why a step did not run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The directory picker was cancelled
    DirectoryNotSelected,
    UnknownStepType(String),
    InvalidStep(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::DirectoryNotSelected => write!(f, "no directory selected"),
            SkipReason::UnknownStepType(kind) => write!(f, "unknown step type '{}'", kind),
            SkipReason::InvalidStep(reason) => write!(f, "invalid step: {}", reason),
        }
    }
}

/// Structured event stream of one request run, in program order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunQueued {
        alias: String,
    },
    RunStarted {
        alias: String,
        device_id: Option<String>,
    },
    DeviceProbed {
        device_id: String,
        is_rooted: bool,
        has_writable_overlay: bool,
    },
    StepStarted {
        index: usize,
        description: String,
    },
    OutputLine {
        index: usize,
        text: String,
        is_error: bool,
    },
    StepCompleted {
        index: usize,
        exit_code: Option<i32>,
        success: bool,
    },
    StepSkipped {
        index: usize,
        reason: SkipReason,
    },
    RunCompleted {
        alias: String,
        status: RunStatus,
    },
}

impl ExecutionEvent {
    /// Get a short label for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::RunQueued { .. } => "run_queued",
            ExecutionEvent::RunStarted { .. } => "run_started",
            ExecutionEvent::DeviceProbed { .. } => "device_probed",
            ExecutionEvent::StepStarted { .. } => "step_started",
            ExecutionEvent::OutputLine { .. } => "output_line",
            ExecutionEvent::StepCompleted { .. } => "step_completed",
            ExecutionEvent::StepSkipped { .. } => "step_skipped",
            ExecutionEvent::RunCompleted { .. } => "run_completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionEvent::RunCompleted { .. })
    }
}

/// Published by the device monitor after every completed probe cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceListChange {
    /// Full list after the merge, in enumeration order
    pub devices: Vec<Device>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl DeviceListChange {
    pub fn is_membership_change(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}
