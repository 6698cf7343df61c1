//! Workflow data model
//!
//! This module contains:
//! - `kind` - Workflow kinds, their parameters and id generation
//! - `step` - Step records and the step tracker
//! - `result` - The terminal result of a run
//! - `context` - Data accumulated across a run's steps
//! - `config` - Application configuration loaded from YAML and env

pub mod config;
pub mod context;
pub mod kind;
pub mod result;
pub mod step;

pub use config::{
    AppConfig, ConfigError, EngineConfig, MonitorConfig, ProviderConfig, RetryConfig, StoreConfig,
};
pub use context::WorkflowData;
pub use kind::{generate_workflow_id, WorkflowKind, WorkflowParams};
pub use result::WorkflowResult;
pub use step::{StepHandle, StepStatus, StepTracker, WorkflowStep};
