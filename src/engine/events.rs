//! Progress events published while runs execute

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Queue depth before new events are dropped
pub const PROGRESS_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    StepStarted {
        workflow_id: String,
        index: usize,
        name: String,
    },
    #[serde(rename_all = "camelCase")]
    StepCompleted {
        workflow_id: String,
        index: usize,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    #[serde(rename_all = "camelCase")]
    StepFailed {
        workflow_id: String,
        index: usize,
        name: String,
        error: String,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished {
        workflow_id: String,
        success: bool,
        execution_time: u64,
    },
}

impl ProgressEvent {
    pub fn workflow_id(&self) -> &str {
        match self {
            ProgressEvent::StepStarted { workflow_id, .. }
            | ProgressEvent::StepCompleted { workflow_id, .. }
            | ProgressEvent::StepFailed { workflow_id, .. }
            | ProgressEvent::RunFinished { workflow_id, .. } => workflow_id,
        }
    }
}

/// Bounded fan-in of progress events; receivers share one queue
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: async_channel::Sender<ProgressEvent>,
    rx: async_channel::Receiver<ProgressEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (tx, rx) = async_channel::bounded(PROGRESS_CAPACITY);
        Self { tx, rx }
    }

    /// Never blocks a run; events are dropped when the queue is full
    pub fn publish(&self, event: ProgressEvent) {
        if let Err(e) = self.tx.try_send(event) {
            debug!("Dropping progress event: {}", e);
        }
    }

    pub fn subscribe(&self) -> async_channel::Receiver<ProgressEvent> {
        self.rx.clone()
    }
}
