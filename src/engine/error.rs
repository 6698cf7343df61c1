//! Workflow error types

use crate::provider::ProviderError;
use crate::store::StoreError;

/// Errors that can occur inside a workflow step
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Missing data from earlier step: {0}")]
    MissingData(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("No handler registered for workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Run cancelled before step started")]
    Cancelled,

    #[error("Deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),
}

impl From<handlebars::RenderError> for WorkflowError {
    fn from(e: handlebars::RenderError) -> Self {
        WorkflowError::Template(e.to_string())
    }
}

impl From<handlebars::TemplateError> for WorkflowError {
    fn from(e: handlebars::TemplateError) -> Self {
        WorkflowError::Template(e.to_string())
    }
}
