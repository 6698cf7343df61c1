//! Workflow Orchestrator - drives one workflow kind's step pipeline
//!
//! For every run it:
//! 1. Generates the workflow id and starts the timer
//! 2. Resolves the kind's definition and checks the params match it
//! 3. Executes the steps in order, recording each on the step tracker
//! 4. Aborts at the first failed step, keeping the completed ones
//! 5. Derives recommendations and confidence on full success
//! 6. Stores the result in the registry and returns it
//!
//! `run` never fails: every problem ends up as a failed step.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::error::WorkflowError;
use super::events::{ProgressChannel, ProgressEvent};
use super::pipeline::{StepContext, WorkflowDefinition};
use super::registry::WorkflowRegistry;
use super::services::Services;
use crate::workflow::{
    generate_workflow_id, EngineConfig, StepTracker, WorkflowData, WorkflowKind, WorkflowParams,
    WorkflowResult,
};

/// Name recorded when a run cannot start its pipeline at all
const RESOLVE_STEP: &str = "Resolve workflow handler";
const VALIDATE_STEP: &str = "Validate parameters";

/// Mutable state of one in-flight run
struct RunState {
    workflow_id: String,
    tracker: StepTracker,
    data: WorkflowData,
    started: Instant,
}

pub struct Orchestrator {
    services: Services,
    registry: WorkflowRegistry,
    config: EngineConfig,
    progress: ProgressChannel,
}

impl Orchestrator {
    /// Orchestrator with the built-in workflow kinds
    pub fn new(services: Services, config: EngineConfig) -> Self {
        Self::with_registry(services, config, WorkflowRegistry::with_defaults())
    }

    pub fn with_registry(
        services: Services,
        config: EngineConfig,
        registry: WorkflowRegistry,
    ) -> Self {
        Self {
            services,
            registry,
            config,
            progress: ProgressChannel::new(),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Progress events for all runs of this orchestrator
    pub fn subscribe(&self) -> async_channel::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Look up a finished run
    pub async fn get(&self, workflow_id: &str) -> Option<WorkflowResult> {
        self.registry.get(workflow_id).await
    }

    pub async fn list_all(&self) -> Vec<WorkflowResult> {
        self.registry.list_all().await
    }

    pub async fn run(&self, kind: WorkflowKind, params: WorkflowParams) -> WorkflowResult {
        self.run_with_cancel(kind, params, CancellationToken::new())
            .await
    }

    /// Run with a cancellation token checked before each step
    #[instrument(skip(self, params, cancel), fields(kind = %kind))]
    pub async fn run_with_cancel(
        &self,
        kind: WorkflowKind,
        params: WorkflowParams,
        cancel: CancellationToken,
    ) -> WorkflowResult {
        let started = Instant::now();
        let started_at = self.services.clock.now().await;
        let workflow_id = generate_workflow_id(kind, &params.subject(), started_at);
        info!(workflow_id = %workflow_id, "Starting workflow");

        let mut state = RunState {
            workflow_id,
            tracker: StepTracker::new(),
            data: WorkflowData::new(),
            started,
        };

        let definition = self.drive(kind, &params, &mut state, &cancel).await;

        let (success, recommendations, confidence) = match definition {
            Some(definition) => {
                let recommendations = definition.recommendations(&params, &state.data);
                let confidence = definition.confidence(&params, &state.data).clamp(0.0, 100.0);
                (true, recommendations, confidence)
            }
            None => (false, Vec::new(), 0.0),
        };

        let execution_time = state.started.elapsed().as_millis() as u64;
        let result = WorkflowResult {
            workflow_id: state.workflow_id,
            kind,
            success,
            steps: state.tracker.into_steps(),
            recommendations,
            data: state.data.into_map(),
            execution_time,
            confidence,
            started_at,
        };

        if result.success {
            info!("{}", result.summary());
        } else {
            warn!("{}", result.summary());
        }

        self.progress.publish(ProgressEvent::RunFinished {
            workflow_id: result.workflow_id.clone(),
            success: result.success,
            execution_time,
        });
        self.registry.store(result.clone()).await;
        result
    }

    /// Execute the pipeline; `Some` only when every step completed
    async fn drive(
        &self,
        kind: WorkflowKind,
        params: &WorkflowParams,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Option<std::sync::Arc<dyn WorkflowDefinition>> {
        let Some(definition) = self.registry.handler(kind) else {
            self.fail_before_pipeline(
                state,
                RESOLVE_STEP,
                WorkflowError::UnknownWorkflow(kind.to_string()),
            )
            .await;
            return None;
        };

        if params.kind() != kind {
            let error = WorkflowError::InvalidParams(format!(
                "{} parameters supplied to {} workflow",
                params.kind(),
                kind
            ));
            self.fail_before_pipeline(state, VALIDATE_STEP, error).await;
            return None;
        }

        let deadline = self.config.deadline_ms.map(Duration::from_millis);

        for step in definition.steps() {
            let timestamp = self.services.clock.now().await;
            let handle = state.tracker.begin_at(step.name(), timestamp);
            let index = handle.index();
            self.progress.publish(ProgressEvent::StepStarted {
                workflow_id: state.workflow_id.clone(),
                index,
                name: step.name().to_string(),
            });

            let interrupted = if cancel.is_cancelled() {
                Some(WorkflowError::Cancelled)
            } else {
                deadline
                    .filter(|d| state.started.elapsed() >= *d)
                    .map(|d| WorkflowError::DeadlineExceeded(d.as_millis() as u64))
            };

            let outcome = match interrupted {
                Some(error) => Err(error),
                None => {
                    debug!(step = step.name(), index, "Executing step");
                    let ctx = StepContext {
                        workflow_id: &state.workflow_id,
                        params,
                        data: &state.data,
                        services: &self.services,
                        config: &self.config,
                    };
                    step.execute(&ctx).await
                }
            };

            match outcome {
                Ok(outcome) => {
                    state.data.merge(outcome.data);
                    state.data.merge_vectors(outcome.vectors);
                    self.progress.publish(ProgressEvent::StepCompleted {
                        workflow_id: state.workflow_id.clone(),
                        index,
                        name: step.name().to_string(),
                        payload: outcome.payload.clone(),
                    });
                    state.tracker.complete(handle, outcome.payload);
                    self.services.clock.advance_step().await;
                }
                Err(e) => {
                    error!(step = step.name(), index, "Step failed: {}", e);
                    self.progress.publish(ProgressEvent::StepFailed {
                        workflow_id: state.workflow_id.clone(),
                        index,
                        name: step.name().to_string(),
                        error: e.to_string(),
                    });
                    state.tracker.fail(handle, e.to_string());
                    return None;
                }
            }
        }

        Some(definition)
    }

    async fn fail_before_pipeline(&self, state: &mut RunState, name: &str, error: WorkflowError) {
        error!("{}: {}", name, error);
        let timestamp = self.services.clock.now().await;
        let handle = state.tracker.begin_at(name, timestamp);
        self.progress.publish(ProgressEvent::StepFailed {
            workflow_id: state.workflow_id.clone(),
            index: handle.index(),
            name: name.to_string(),
            error: error.to_string(),
        });
        state.tracker.fail(handle, error.to_string());
    }
}
