//! Workflow registry
//!
//! Maps each `WorkflowKind` to its definition and keeps every finished
//! `WorkflowResult` for lookup by id for the life of the process.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::pipeline::WorkflowDefinition;
use crate::workflow::{WorkflowKind, WorkflowResult};

#[derive(Debug, Default)]
struct ResultState {
    positions: HashMap<String, usize>,
    results: Vec<WorkflowResult>,
}

#[derive(Clone, Default)]
pub struct WorkflowRegistry {
    handlers: HashMap<WorkflowKind, Arc<dyn WorkflowDefinition>>,
    results: Arc<RwLock<ResultState>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three built-in workflows
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for definition in crate::workflows::builtin_definitions() {
            registry.register(definition);
        }
        registry
    }

    /// Replaces any handler already registered for the same kind
    pub fn register(&mut self, definition: Arc<dyn WorkflowDefinition>) {
        self.handlers.insert(definition.kind(), definition);
    }

    pub fn handler(&self, kind: WorkflowKind) -> Option<Arc<dyn WorkflowDefinition>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<WorkflowKind> {
        WorkflowKind::ALL
            .into_iter()
            .filter(|k| self.handlers.contains_key(k))
            .collect()
    }

    /// Upsert by workflow id; last write wins
    pub async fn store(&self, result: WorkflowResult) {
        let mut state = self.results.write().await;
        match state.positions.get(&result.workflow_id) {
            Some(&position) => state.results[position] = result,
            None => {
                let position = state.results.len();
                state.positions.insert(result.workflow_id.clone(), position);
                state.results.push(result);
            }
        }
    }

    pub async fn get(&self, workflow_id: &str) -> Option<WorkflowResult> {
        let state = self.results.read().await;
        state
            .positions
            .get(workflow_id)
            .map(|&position| state.results[position].clone())
    }

    /// Every stored result, oldest first
    pub async fn list_all(&self) -> Vec<WorkflowResult> {
        self.results.read().await.results.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.results.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
