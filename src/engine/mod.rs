//! Workflow execution engine module
//!
//! This module contains:
//! - `orchestrator` - Runs a workflow kind's steps and assembles the result
//! - `pipeline` - Step and workflow definition traits
//! - `registry` - Workflow handlers and finished results
//! - `services` - Injected providers, stores and clock
//! - `events` - Progress events published during runs
//! - `clock` - Real or virtual time for step timestamps
//! - `error` - Workflow error types

pub mod clock;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod services;

pub use clock::Clock;
pub use error::WorkflowError;
pub use events::{ProgressChannel, ProgressEvent};
pub use orchestrator::Orchestrator;
pub use pipeline::{PipelineStep, StepContext, StepOutcome, WorkflowDefinition};
pub use registry::WorkflowRegistry;
pub use services::Services;
