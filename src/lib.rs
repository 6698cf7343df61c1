//! # Fleet Workflows
//!
//! Orchestrates multi-step AI workflows for a logistics fleet. Each workflow
//! kind is a fixed pipeline of steps that call an embedding provider, a
//! similarity store and a completion provider, tracking every step and
//! producing a single `WorkflowResult`.
//!
//! ## Workflow kinds
//!
//! - **Predictive Maintenance** (5 steps): telemetry, similar vehicles, AI
//!   analysis, maintenance event, recommendations
//! - **Route Optimization** (5 steps): route data, similar routes, AI
//!   optimization, persisted result, recommendations
//! - **Emergency Response** (4 steps): logged emergency, similar cases, AI
//!   strategy, vehicle dispatch
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fleet_workflows::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default().with_env();
//!     let (services, _store) = Services::from_config(&config);
//!     let orchestrator = Orchestrator::new(services, config.engine);
//!
//!     let result = orchestrator
//!         .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-001"))
//!         .await;
//!
//!     println!("{}: success={}", result.workflow_id, result.success);
//!     for line in &result.recommendations {
//!         println!("  - {}", line);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Without provider credentials the run still completes using deterministic
//! placeholder embeddings and analysis text.

pub mod engine;
pub mod monitor;
pub mod provider;
pub mod store;
pub mod workflow;
pub mod workflows;

// Re-export main types
pub use engine::{
    Clock, Orchestrator, PipelineStep, ProgressEvent, Services, StepContext, StepOutcome,
    WorkflowDefinition, WorkflowError, WorkflowRegistry,
};
pub use monitor::FleetMonitor;
pub use provider::{
    CompletionProvider, EmbeddingProvider, GuardedCompleter, GuardedEmbedder, OpenAiClient,
    ProviderError, ProviderErrorPolicy, EMBEDDING_DIMENSION,
};
pub use store::{EventLog, MemoryStore, SimilarityStore, StoreError};
pub use workflow::{
    AppConfig, ConfigError, EngineConfig, StepStatus, WorkflowKind, WorkflowParams,
    WorkflowResult, WorkflowStep,
};
pub use workflows::{DataSource, SyntheticDataSource};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::engine::{Orchestrator, ProgressEvent, Services, WorkflowRegistry};
    pub use crate::monitor::FleetMonitor;
    pub use crate::provider::{CompletionProvider, EmbeddingProvider, ProviderErrorPolicy};
    pub use crate::store::{EventLog, MemoryStore, SimilarityStore};
    pub use crate::workflow::{
        AppConfig, EngineConfig, StepStatus, WorkflowKind, WorkflowParams, WorkflowResult,
    };
}
