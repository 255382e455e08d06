//! Step model and runtime placeholder substitution
//!
//! A [`StepRecord`] is what is stored on disk: a loosely typed
//! `{type, value, local_dir}` triple. It is converted into the closed
//! [`Step`] sum type at dispatch time, so records with kinds this build does
//! not understand survive a load/save round trip untouched.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Replaced by the selected device id
pub const DEVICE_PLACEHOLDER: &str = "{dev}";

/// Replaced by the directory chosen through the directory picker
pub const LOCAL_DIR_PLACEHOLDER: &str = "{local_dir}";

// ─────────────────────────────────────────────────────────────────
// Step
// ─────────────────────────────────────────────────────────────────

/// Step type discriminant, as written in persisted records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    ShellCommand,
    DeviceCommand,
    Delay,
}

impl StepKind {
    /// Wire name used when persisting a record
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ShellCommand => "command",
            StepKind::DeviceCommand => "adb_command",
            StepKind::Delay => "delay",
        }
    }
}

impl FromStr for StepKind {
    type Err = StepError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "command" | "shell" => Ok(StepKind::ShellCommand),
            "adb_command" | "device_command" => Ok(StepKind::DeviceCommand),
            "delay" => Ok(StepKind::Delay),
            _ => Err(StepError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a record could not become a [`Step`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepError {
    #[error("unknown step type '{0}'")]
    UnknownKind(String),

    #[error("command text is empty")]
    EmptyCommand,

    #[error("invalid delay '{0}': expected a positive number of milliseconds")]
    InvalidDelay(String),
}

/// One unit of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run through the host shell
    ShellCommand { text: String },

    /// Run through the host shell after `{dev}` (and optionally
    /// `{local_dir}`) substitution
    DeviceCommand { text: String, uses_local_dir: bool },

    /// Pure wait
    Delay { duration_ms: u64 },
}

impl Step {
    pub fn shell(text: impl Into<String>) -> Result<Self, StepError> {
        Ok(Step::ShellCommand {
            text: non_empty(text.into())?,
        })
    }

    pub fn device(text: impl Into<String>, uses_local_dir: bool) -> Result<Self, StepError> {
        Ok(Step::DeviceCommand {
            text: non_empty(text.into())?,
            uses_local_dir,
        })
    }

    pub fn delay(duration_ms: u64) -> Result<Self, StepError> {
        if duration_ms == 0 {
            return Err(StepError::InvalidDelay("0".to_string()));
        }
        Ok(Step::Delay { duration_ms })
    }

    pub fn kind(&self) -> StepKind {
        match self {
            Step::ShellCommand { .. } => StepKind::ShellCommand,
            Step::DeviceCommand { .. } => StepKind::DeviceCommand,
            Step::Delay { .. } => StepKind::Delay,
        }
    }

    pub fn needs_device(&self) -> bool {
        matches!(self, Step::DeviceCommand { .. })
    }

    /// True when the directory picker has to be consulted before running
    pub fn needs_local_dir(&self) -> bool {
        match self {
            Step::DeviceCommand {
                text,
                uses_local_dir,
            } => *uses_local_dir && text.contains(LOCAL_DIR_PLACEHOLDER),
            _ => false,
        }
    }

    pub fn to_record(&self) -> StepRecord {
        match self {
            Step::ShellCommand { text } => StepRecord::shell(text.clone()),
            Step::DeviceCommand {
                text,
                uses_local_dir,
            } => StepRecord::device(text.clone(), *uses_local_dir),
            Step::Delay { duration_ms } => StepRecord::delay(*duration_ms),
        }
    }

    /// Human-readable one-liner used in `StepStarted` events
    pub fn describe(&self) -> String {
        match self {
            Step::ShellCommand { text } | Step::DeviceCommand { text, .. } => text.clone(),
            Step::Delay { duration_ms } => format!("delay {}ms", duration_ms),
        }
    }
}

fn non_empty(text: String) -> Result<String, StepError> {
    if text.trim().is_empty() {
        Err(StepError::EmptyCommand)
    } else {
        Ok(text)
    }
}

// ─────────────────────────────────────────────────────────────────
// StepRecord
// ─────────────────────────────────────────────────────────────────

/// Persisted form of a step
///
/// Field names are read case-insensitively for the ones that matter
/// (`type`/`Type`, `value`/`Value`, `local_dir`/`LocalDir`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepRecord {
    #[serde(rename = "type", alias = "Type")]
    pub kind: String,

    #[serde(default, alias = "Value")]
    pub value: String,

    #[serde(default, alias = "LocalDir", skip_serializing_if = "Option::is_none")]
    pub local_dir: Option<bool>,
}

impl StepRecord {
    pub fn shell(text: impl Into<String>) -> Self {
        Self {
            kind: StepKind::ShellCommand.as_str().to_string(),
            value: text.into(),
            local_dir: None,
        }
    }

    pub fn device(text: impl Into<String>, uses_local_dir: bool) -> Self {
        Self {
            kind: StepKind::DeviceCommand.as_str().to_string(),
            value: text.into(),
            local_dir: Some(uses_local_dir),
        }
    }

    pub fn delay(duration_ms: u64) -> Self {
        Self {
            kind: StepKind::Delay.as_str().to_string(),
            value: duration_ms.to_string(),
            local_dir: None,
        }
    }

    /// Recognized kind, if any
    pub fn step_kind(&self) -> Option<StepKind> {
        self.kind.parse().ok()
    }

    /// Convert into a typed step
    pub fn parse(&self) -> Result<Step, StepError> {
        match self.kind.parse::<StepKind>()? {
            StepKind::ShellCommand => Step::shell(self.value.clone()),
            StepKind::DeviceCommand => {
                Step::device(self.value.clone(), self.local_dir.unwrap_or(false))
            }
            StepKind::Delay => {
                let ms = self
                    .value
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| StepError::InvalidDelay(self.value.clone()))?;
                if ms == 0 {
                    return Err(StepError::InvalidDelay(self.value.clone()));
                }
                Step::delay(ms)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Placeholder substitution
// ─────────────────────────────────────────────────────────────────

/// Replace every `{dev}` with the device id (empty string when none)
pub fn substitute_device(text: &str, device_id: Option<&str>) -> String {
    text.replace(DEVICE_PLACEHOLDER, device_id.unwrap_or(""))
}

/// Replace every `{local_dir}` with the chosen directory
pub fn substitute_local_dir(text: &str, local_dir: &str) -> String {
    text.replace(LOCAL_DIR_PLACEHOLDER, local_dir)
}

/// Full substitution for a device command: `{dev}` first, then
/// `{local_dir}` only when the step opted in and a directory was chosen.
pub fn render_command(
    text: &str,
    device_id: Option<&str>,
    uses_local_dir: bool,
    local_dir: Option<&str>,
) -> String {
    let rendered = substitute_device(text, device_id);
    match (uses_local_dir, local_dir) {
        (true, Some(dir)) => substitute_local_dir(&rendered, dir),
        _ => rendered,
    }
}
