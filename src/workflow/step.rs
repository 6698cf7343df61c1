//! Step records and the tracker that owns them
//!
//! A step is created `running` right before its external call and moved to
//! `completed` or `failed` right after. Handles are consumed by the terminal
//! transition, so a finished step cannot be touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    /// 1-based position in the pipeline
    pub index: usize,
    pub name: String,
    pub status: StepStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Refers to the step most recently begun
#[derive(Debug)]
pub struct StepHandle {
    position: usize,
}

impl StepHandle {
    pub fn index(&self) -> usize {
        self.position + 1
    }
}

#[derive(Debug, Default)]
pub struct StepTracker {
    steps: Vec<WorkflowStep>,
    failed: bool,
}

impl StepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a `running` step stamped with the current time
    pub fn begin(&mut self, name: impl Into<String>) -> StepHandle {
        self.begin_at(name, Utc::now())
    }

    pub fn begin_at(&mut self, name: impl Into<String>, timestamp: DateTime<Utc>) -> StepHandle {
        debug_assert!(!self.failed, "no steps may begin after a failure");
        let position = self.steps.len();
        self.steps.push(WorkflowStep {
            index: position + 1,
            name: name.into(),
            status: StepStatus::Running,
            timestamp,
            payload: None,
            error: None,
        });
        StepHandle { position }
    }

    pub fn complete(&mut self, handle: StepHandle, payload: Option<Value>) {
        if let Some(step) = self.steps.get_mut(handle.position) {
            step.status = StepStatus::Completed;
            step.payload = payload;
        }
    }

    pub fn fail(&mut self, handle: StepHandle, error: impl Into<String>) {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = "unknown error".to_string();
        }
        if let Some(step) = self.steps.get_mut(handle.position) {
            step.status = StepStatus::Failed;
            step.error = Some(error);
        }
        self.failed = true;
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn into_steps(self) -> Vec<WorkflowStep> {
        self.steps
    }
}
