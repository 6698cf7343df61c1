//! Generic step pipeline
//!
//! A workflow kind is an ordered list of `PipelineStep`s plus two pure
//! derivations over the accumulated data. Steps never mutate shared state
//! directly: they return a `StepOutcome` which the orchestrator merges only
//! when the step succeeds.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::error::WorkflowError;
use super::services::Services;
use crate::workflow::{EngineConfig, WorkflowData, WorkflowKind, WorkflowParams};

/// Read-only view handed to each step
pub struct StepContext<'a> {
    pub workflow_id: &'a str,
    pub params: &'a WorkflowParams,
    pub data: &'a WorkflowData,
    pub services: &'a Services,
    pub config: &'a EngineConfig,
}

/// What a successful step contributes
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub data: Vec<(String, Value)>,
    pub vectors: Vec<(String, Vec<f32>)>,
    pub payload: Option<Value>,
}

impl StepOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.push((key.into(), value));
        self
    }

    pub fn put<T: Serialize>(
        mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<Self, WorkflowError> {
        self.data.push((key.into(), serde_json::to_value(value)?));
        Ok(self)
    }

    /// Embedding kept for later steps, not part of the result data
    pub fn vector(mut self, key: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.push((key.into(), vector));
        self
    }

    /// Summary recorded on the step record
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError>;
}

/// One workflow kind: its steps and its result derivations
pub trait WorkflowDefinition: Send + Sync {
    fn kind(&self) -> WorkflowKind;

    fn steps(&self) -> &[Box<dyn PipelineStep>];

    /// Ordered, most urgent first; only called after every step completed
    fn recommendations(&self, params: &WorkflowParams, data: &WorkflowData) -> Vec<String>;

    /// 0-100
    fn confidence(&self, params: &WorkflowParams, data: &WorkflowData) -> f64;

    fn step_names(&self) -> Vec<&'static str> {
        self.steps().iter().map(|s| s.name()).collect()
    }
}
