//! Emergency Response workflow

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::helpers::{embed_text, exclude_self, first_sentence, render_prompt, similarity_pct};
use crate::engine::{PipelineStep, StepContext, StepOutcome, WorkflowDefinition, WorkflowError};
use crate::store::{LogisticsEvent, NewEvent, Severity};
use crate::workflow::{WorkflowData, WorkflowKind, WorkflowParams};

/// Upper bound on vehicles sent to one emergency
pub const MAX_DISPATCH: usize = 3;

const SYSTEM_INSTRUCTION: &str = "You are an emergency logistics coordinator. Respond with an immediate, concrete action plan: what to do first, which resources to send, and how to keep responders safe.";

const STRATEGY_TEMPLATE: &str = "Emergency: {{emergency_type}}
Location: {{location}}

{{#if similar}}Similar past emergencies:
{{#each similar}}- {{description}} (severity {{severity}}, similarity {{similarity}}%)
{{/each}}{{else}}No similar emergencies on record.
{{/if}}
Give a step-by-step response plan for the first 30 minutes.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarEmergency {
    pub event_id: String,
    pub description: String,
    pub severity: Severity,
    pub similarity: f64,
}

pub fn emergency_confidence(dispatched: usize) -> f64 {
    (90.0 + 2.0 * dispatched as f64).min(100.0)
}

pub fn emergency_recommendations(
    emergency_type: &str,
    location: &str,
    dispatched: usize,
    strategy: &str,
) -> Vec<String> {
    vec![
        format!("Emergency response protocol activated for {}", emergency_type),
        format!("Location: {}", location),
        format!(
            "Dispatched {} vehicle{} to the scene",
            dispatched,
            if dispatched == 1 { "" } else { "s" }
        ),
        "Estimated arrival: 8-12 minutes".to_string(),
        format!("AI strategy: {}", first_sentence(strategy)),
    ]
}

fn emergency_params(params: &WorkflowParams) -> Result<(&str, &str), WorkflowError> {
    match params {
        WorkflowParams::EmergencyResponse {
            emergency_type,
            location,
        } => Ok((emergency_type.as_str(), location.as_str())),
        other => Err(WorkflowError::InvalidParams(format!(
            "expected emergency parameters, got {}",
            other.kind()
        ))),
    }
}

struct LogEmergency;

#[async_trait]
impl PipelineStep for LogEmergency {
    fn name(&self) -> &'static str {
        "Log emergency"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let (emergency_type, location) = emergency_params(ctx.params)?;
        let description = format!("{} at {}", emergency_type, location);
        let vector = embed_text(ctx, &description).await?;

        let mut event = NewEvent::new(
            WorkflowKind::EmergencyResponse.id(),
            Severity::Critical,
            description,
        );
        event.metadata = json!({
            "emergencyType": emergency_type,
            "location": location,
            "workflowId": ctx.workflow_id,
        });
        event.embedding = Some(vector.clone());

        let mut stored = ctx.services.events.insert_event(event).await?;
        stored.embedding = None;
        warn!(event_id = %stored.id, "Emergency logged: {}", stored.description);

        Ok(StepOutcome::new()
            .payload(json!({ "eventId": stored.id }))
            .put("emergencyEvent", &stored)?
            .vector("emergency", vector))
    }
}

struct FindSimilarEmergencies;

#[async_trait]
impl PipelineStep for FindSimilarEmergencies {
    fn name(&self) -> &'static str {
        "Find similar emergencies"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let logged: LogisticsEvent = ctx.data.require("emergencyEvent")?;
        let vector = ctx.data.require_vector("emergency")?;
        let limit = ctx.config.similar_limit;

        let hits = ctx
            .services
            .similarity
            .find_similar_events(vector, Some(WorkflowKind::EmergencyResponse.id()), limit + 1)
            .await?;
        let similar: Vec<SimilarEmergency> = exclude_self(hits, |h| h.entity.id == logged.id, limit)
            .into_iter()
            .map(|h| SimilarEmergency {
                similarity: similarity_pct(h.distance),
                event_id: h.entity.id,
                description: h.entity.description,
                severity: h.entity.severity,
            })
            .collect();

        Ok(StepOutcome::new()
            .payload(json!({ "count": similar.len() }))
            .put("similarEmergencies", &similar)?)
    }
}

struct ResponseStrategy;

#[async_trait]
impl PipelineStep for ResponseStrategy {
    fn name(&self) -> &'static str {
        "AI response strategy"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let (emergency_type, location) = emergency_params(ctx.params)?;
        let similar: Vec<SimilarEmergency> = ctx.data.require("similarEmergencies")?;

        let prompt = render_prompt(
            STRATEGY_TEMPLATE,
            &json!({
                "emergency_type": emergency_type,
                "location": location,
                "similar": similar,
            }),
        )?;
        let strategy = ctx
            .services
            .completer
            .complete(&prompt, Some(SYSTEM_INSTRUCTION))
            .await?;

        Ok(StepOutcome::new()
            .payload(json!({ "chars": strategy.chars().count() }))
            .set("aiStrategy", json!(strategy)))
    }
}

struct DispatchVehicles;

#[async_trait]
impl PipelineStep for DispatchVehicles {
    fn name(&self) -> &'static str {
        "Dispatch vehicles"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let dispatched: Vec<String> = ctx
            .services
            .events
            .available_vehicles(MAX_DISPATCH)
            .await?
            .into_iter()
            .map(|v| v.vehicle_id)
            .collect();
        info!(count = dispatched.len(), "Dispatching vehicles: {:?}", dispatched);

        Ok(StepOutcome::new()
            .payload(json!({ "count": dispatched.len() }))
            .put("dispatchedVehicles", &dispatched)?)
    }
}

pub struct EmergencyWorkflow {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Default for EmergencyWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl EmergencyWorkflow {
    pub fn new() -> Self {
        Self {
            steps: vec![
                Box::new(LogEmergency),
                Box::new(FindSimilarEmergencies),
                Box::new(ResponseStrategy),
                Box::new(DispatchVehicles),
            ],
        }
    }
}

impl WorkflowDefinition for EmergencyWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::EmergencyResponse
    }

    fn steps(&self) -> &[Box<dyn PipelineStep>] {
        &self.steps
    }

    fn recommendations(&self, params: &WorkflowParams, data: &WorkflowData) -> Vec<String> {
        let Ok((emergency_type, location)) = emergency_params(params) else {
            return Vec::new();
        };
        let dispatched = data
            .get::<Vec<String>>("dispatchedVehicles")
            .map_or(0, |v| v.len());
        let strategy = data.str("aiStrategy").unwrap_or_default();
        emergency_recommendations(emergency_type, location, dispatched, strategy)
    }

    fn confidence(&self, _params: &WorkflowParams, data: &WorkflowData) -> f64 {
        let dispatched = data
            .get::<Vec<String>>("dispatchedVehicles")
            .map_or(0, |v| v.len());
        emergency_confidence(dispatched)
    }
}
