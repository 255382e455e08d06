//! Ephemeral record of one request run

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::events::{ExecutionEvent, SkipReason};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Succeeded | RunStatus::Failed | RunStatus::Cancelled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub is_error: bool,
}

/// Everything observed for one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub index: usize,
    pub description: String,
    pub lines: Vec<OutputLine>,
    pub exit_code: Option<i32>,
    pub success: Option<bool>,
    pub skipped: Option<SkipReason>,
}

/// Folded view of an [`ExecutionEvent`] stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRun {
    pub alias: String,
    pub device_id: Option<String>,
    pub current_step: Option<usize>,
    pub steps: Vec<StepOutput>,
    pub status: RunStatus,
}

impl ExecutionRun {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..Default::default()
        }
    }

    /// Fold one event into the record
    pub fn apply(&mut self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunQueued { alias } => {
                self.alias.clone_from(alias);
                self.status = RunStatus::Pending;
            }
            ExecutionEvent::RunStarted { alias, device_id } => {
                self.alias.clone_from(alias);
                self.device_id.clone_from(device_id);
                self.status = RunStatus::Running;
            }
            ExecutionEvent::DeviceProbed { .. } => {}
            ExecutionEvent::StepStarted { index, description } => {
                self.current_step = Some(*index);
                self.step_mut(*index).description.clone_from(description);
            }
            ExecutionEvent::OutputLine {
                index,
                text,
                is_error,
            } => {
                self.step_mut(*index).lines.push(OutputLine {
                    text: text.clone(),
                    is_error: *is_error,
                });
            }
            ExecutionEvent::StepCompleted {
                index,
                exit_code,
                success,
            } => {
                let step = self.step_mut(*index);
                step.exit_code = *exit_code;
                step.success = Some(*success);
            }
            ExecutionEvent::StepSkipped { index, reason } => {
                self.current_step = Some(*index);
                self.step_mut(*index).skipped = Some(reason.clone());
            }
            ExecutionEvent::RunCompleted { status, .. } => {
                self.current_step = None;
                self.status = *status;
            }
        }
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutput> {
        self.steps.iter().filter(|s| s.success == Some(false))
    }

    pub fn skipped_steps(&self) -> impl Iterator<Item = &StepOutput> {
        self.steps.iter().filter(|s| s.skipped.is_some())
    }

    fn step_mut(&mut self, index: usize) -> &mut StepOutput {
        let pos = match self.steps.iter().position(|s| s.index == index) {
            Some(pos) => pos,
            None => {
                self.steps.push(StepOutput {
                    index,
                    ..Default::default()
                });
                self.steps.len() - 1
            }
        };
        &mut self.steps[pos]
    }
}
