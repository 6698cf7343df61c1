//! The terminal record of a workflow run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kind::WorkflowKind;
use super::step::{StepStatus, WorkflowStep};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub kind: WorkflowKind,
    pub success: bool,
    pub steps: Vec<WorkflowStep>,
    /// Non-empty only for successful runs, most urgent first
    pub recommendations: Vec<String>,
    /// Intermediate artifacts keyed by name
    pub data: Map<String, Value>,
    /// Milliseconds from invocation to terminal state
    pub execution_time: u64,
    /// 0-100; 0 when the run failed
    pub confidence: f64,
    pub started_at: DateTime<Utc>,
}

impl WorkflowResult {
    /// The step that aborted the run, if any
    pub fn failed_step(&self) -> Option<&WorkflowStep> {
        self.steps
            .last()
            .filter(|s| s.status == StepStatus::Failed)
    }

    /// Every pipeline step ran and completed
    pub fn is_complete(&self) -> bool {
        self.steps.len() == self.kind.pipeline_len()
            && self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }

    /// Short human-readable outcome line
    pub fn summary(&self) -> String {
        match self.failed_step() {
            Some(step) => format!(
                "{} failed at step {} ({}): {}",
                self.workflow_id,
                step.index,
                step.name,
                step.error.as_deref().unwrap_or("unknown error")
            ),
            None => format!(
                "{} completed {} steps in {}ms, confidence {:.0}%",
                self.workflow_id,
                self.steps.len(),
                self.execution_time,
                self.confidence
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::StepTracker;

    fn result_with(tracker: StepTracker, success: bool) -> WorkflowResult {
        WorkflowResult {
            workflow_id: "emergency_response_ME_1".to_string(),
            kind: WorkflowKind::EmergencyResponse,
            success,
            steps: tracker.into_steps(),
            recommendations: vec![],
            data: Map::new(),
            execution_time: 12,
            confidence: 0.0,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_failed_step_and_summary() {
        let mut tracker = StepTracker::new();
        let h = tracker.begin("Log emergency");
        tracker.complete(h, None);
        let h = tracker.begin("Find similar emergencies");
        tracker.fail(h, "store offline");

        let result = result_with(tracker, false);
        assert_eq!(result.failed_step().unwrap().index, 2);
        assert!(!result.is_complete());
        assert!(result.summary().contains("store offline"));
    }

    #[test]
    fn test_complete_run() {
        let mut tracker = StepTracker::new();
        for i in 0..4 {
            let h = tracker.begin(format!("step {}", i));
            tracker.complete(h, None);
        }
        let result = result_with(tracker, true);
        assert!(result.failed_step().is_none());
        assert!(result.is_complete());
    }

    #[test]
    fn test_camel_case_fields() {
        let result = result_with(StepTracker::new(), false);
        let value = serde_json::to_value(&result).unwrap();
        assert!(value.get("workflowId").is_some());
        assert!(value.get("executionTime").is_some());
        assert_eq!(value["kind"], "emergency_response");
    }
}
