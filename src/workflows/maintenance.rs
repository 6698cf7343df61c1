//! Predictive Maintenance workflow
//!
//! Gathers (or synthesizes) a vehicle's telemetry, compares it with similar
//! vehicles, asks the completion provider for an assessment, records a
//! maintenance event and derives a prioritised action list.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::helpers::{embed_text, exclude_self, first_sentence, render_prompt, similarity_pct};
use crate::engine::{PipelineStep, StepContext, StepOutcome, WorkflowDefinition, WorkflowError};
use crate::store::{NewEvent, Severity, Vehicle, VehicleMetrics, VehicleStatus, VehicleUpsert};
use crate::workflow::{WorkflowData, WorkflowKind, WorkflowParams};

const DEFAULT_VEHICLE_TYPE: &str = "truck";

/// Similar vehicles quoted in the analysis prompt
const PROMPT_SIMILAR: usize = 3;

const SYSTEM_INSTRUCTION: &str = "You are a fleet maintenance expert. Predict component failures from vehicle telemetry and give short, actionable maintenance advice ordered by urgency.";

const ANALYSIS_TEMPLATE: &str = "Assess the maintenance needs of vehicle {{vehicle_id}} ({{vehicle_type}}).

Current telemetry: {{summary}}

{{#if similar}}Comparable vehicles in the fleet:
{{#each similar}}- {{vehicle_id}}: brake wear {{brake_wear}}%, engine temperature {{engine_temp}}C, similarity {{similarity}}%
{{/each}}{{else}}No comparable vehicles on record.
{{/if}}
Identify the components most likely to fail, how soon service is needed, and what to inspect first.";

const BRAKE_URGENT: f64 = 80.0;
const BRAKE_CRITICAL: f64 = 90.0;
const ENGINE_TEMP_URGENT: f64 = 95.0;
const COOLANT_LOW: f64 = 30.0;
const BATTERY_LOW: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Immediate,
    Soon,
    Routine,
}

impl Urgency {
    /// Days within which service should be scheduled
    pub fn window_days(&self) -> u32 {
        match self {
            Urgency::Immediate => 1,
            Urgency::Soon => 3,
            Urgency::Routine => 14,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Immediate => "immediate",
            Urgency::Soon => "soon",
            Urgency::Routine => "routine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Critical,
    Elevated,
    Normal,
}

/// Threshold classification shared by the event and the recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub severity: Severity,
    pub urgency: Urgency,
    pub risk_level: RiskLevel,
}

impl Assessment {
    pub fn from_metrics(metrics: &VehicleMetrics) -> Self {
        let over_threshold =
            metrics.brake_wear > BRAKE_URGENT || metrics.engine_temp > ENGINE_TEMP_URGENT;
        let severity = if over_threshold {
            Severity::High
        } else {
            Severity::Medium
        };

        let (urgency, risk_level) = if metrics.brake_wear > BRAKE_CRITICAL {
            (Urgency::Immediate, RiskLevel::Critical)
        } else if severity == Severity::High {
            (Urgency::Soon, RiskLevel::Elevated)
        } else {
            (Urgency::Routine, RiskLevel::Normal)
        };

        Self {
            severity,
            urgency,
            risk_level,
        }
    }
}

/// `100 - brake_wear`, clamped and rounded
pub fn maintenance_confidence(metrics: &VehicleMetrics) -> f64 {
    (100.0 - metrics.brake_wear).clamp(0.0, 100.0).round()
}

/// Ordered action list, urgent warnings first
pub fn maintenance_recommendations(
    vehicle_id: &str,
    metrics: &VehicleMetrics,
    analysis: &str,
) -> Vec<String> {
    let assessment = Assessment::from_metrics(metrics);
    let mut recommendations = Vec::new();

    if metrics.brake_wear > BRAKE_CRITICAL {
        recommendations.push(format!(
            "CRITICAL: Brake wear at {:.1}%, take {} out of service until brakes are replaced",
            metrics.brake_wear, vehicle_id
        ));
    } else if metrics.brake_wear > BRAKE_URGENT {
        recommendations.push(format!(
            "URGENT: Brake wear at {:.1}%, replace brake pads",
            metrics.brake_wear
        ));
    }
    if metrics.engine_temp > ENGINE_TEMP_URGENT {
        recommendations.push(format!(
            "URGENT: Engine temperature at {:.1}C, inspect the cooling system",
            metrics.engine_temp
        ));
    }
    if let Some(coolant) = metrics.coolant_level.filter(|c| *c < COOLANT_LOW) {
        recommendations.push(format!("Coolant level low at {:.1}%, top up coolant", coolant));
    }
    if metrics.battery_level < BATTERY_LOW {
        recommendations.push(format!(
            "Battery level low at {:.1}%, check charging system",
            metrics.battery_level
        ));
    }

    let days = assessment.urgency.window_days();
    recommendations.push(format!(
        "Schedule maintenance for {} within {} day{}",
        vehicle_id,
        days,
        if days == 1 { "" } else { "s" }
    ));
    recommendations.push(format!("AI insight: {}", first_sentence(analysis)));
    recommendations.push(format!("Confidence: {:.0}%", maintenance_confidence(metrics)));
    recommendations
}

/// Similar vehicle as kept in the run data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarVehicle {
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub status: VehicleStatus,
    pub brake_wear: f64,
    pub engine_temp: f64,
    pub similarity: f64,
}

fn maintenance_params(params: &WorkflowParams) -> Result<(&str, &str), WorkflowError> {
    match params {
        WorkflowParams::Maintenance {
            vehicle_id,
            vehicle_type,
        } => Ok((
            vehicle_id.as_str(),
            vehicle_type.as_deref().unwrap_or(DEFAULT_VEHICLE_TYPE),
        )),
        other => Err(WorkflowError::InvalidParams(format!(
            "expected maintenance parameters, got {}",
            other.kind()
        ))),
    }
}

struct GatherTelemetry;

#[async_trait]
impl PipelineStep for GatherTelemetry {
    fn name(&self) -> &'static str {
        "Gather vehicle telemetry"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let (vehicle_id, vehicle_type) = maintenance_params(ctx.params)?;

        let stored = ctx.services.events.get_vehicle(vehicle_id).await?;
        let (vehicle, vector, synthesized) = match stored {
            Some(mut vehicle) => {
                let vector = match vehicle.embedding.take() {
                    Some(vector) => vector,
                    None => embed_text(ctx, &vehicle.metrics.summary()).await?,
                };
                (vehicle, vector, false)
            }
            None => {
                let metrics = ctx
                    .services
                    .data_source
                    .fetch_or_synthesize(vehicle_id, vehicle_type)
                    .await?;
                let vector = embed_text(ctx, &metrics.summary()).await?;
                let mut vehicle = ctx
                    .services
                    .events
                    .upsert_vehicle(
                        VehicleUpsert::new(vehicle_id)
                            .vehicle_type(vehicle_type)
                            .status(VehicleStatus::Active)
                            .metrics(metrics)
                            .embedding(vector.clone()),
                    )
                    .await?;
                vehicle.embedding = None;
                info!(vehicle_id, "Synthesized telemetry for unknown vehicle");
                (vehicle, vector, true)
            }
        };

        Ok(StepOutcome::new()
            .put("vehicle", &vehicle)?
            .set("synthesized", json!(synthesized))
            .vector("vehicle", vector)
            .payload(json!({ "vehicleId": vehicle.vehicle_id, "synthesized": synthesized })))
    }
}

struct FindSimilarVehicles;

#[async_trait]
impl PipelineStep for FindSimilarVehicles {
    fn name(&self) -> &'static str {
        "Find similar vehicles"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let vehicle: Vehicle = ctx.data.require("vehicle")?;
        let vector = ctx.data.require_vector("vehicle")?;
        let limit = ctx.config.similar_limit;

        let hits = ctx
            .services
            .similarity
            .find_similar_vehicles(vector, Some(&vehicle.vehicle_type), limit + 1)
            .await?;
        let similar: Vec<SimilarVehicle> =
            exclude_self(hits, |h| h.entity.vehicle_id == vehicle.vehicle_id, limit)
                .into_iter()
                .map(|h| SimilarVehicle {
                    similarity: similarity_pct(h.distance),
                    vehicle_id: h.entity.vehicle_id,
                    vehicle_type: h.entity.vehicle_type,
                    status: h.entity.status,
                    brake_wear: h.entity.metrics.brake_wear,
                    engine_temp: h.entity.metrics.engine_temp,
                })
                .collect();
        debug!(count = similar.len(), "Similar vehicles found");

        Ok(StepOutcome::new()
            .put("similarVehicles", &similar)?
            .payload(json!({ "count": similar.len() })))
    }
}

struct MaintenanceAnalysis;

#[async_trait]
impl PipelineStep for MaintenanceAnalysis {
    fn name(&self) -> &'static str {
        "AI maintenance analysis"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let vehicle: Vehicle = ctx.data.require("vehicle")?;
        let similar: Vec<SimilarVehicle> = ctx.data.require("similarVehicles")?;

        let prompt = render_prompt(
            ANALYSIS_TEMPLATE,
            &json!({
                "vehicle_id": vehicle.vehicle_id,
                "vehicle_type": vehicle.vehicle_type,
                "summary": vehicle.metrics.summary(),
                "similar": similar.iter().take(PROMPT_SIMILAR).collect::<Vec<_>>(),
            }),
        )?;
        let analysis = ctx
            .services
            .completer
            .complete(&prompt, Some(SYSTEM_INSTRUCTION))
            .await?;

        Ok(StepOutcome::new()
            .payload(json!({ "chars": analysis.chars().count() }))
            .set("aiAnalysis", json!(analysis)))
    }
}

struct RecordMaintenanceEvent;

#[async_trait]
impl PipelineStep for RecordMaintenanceEvent {
    fn name(&self) -> &'static str {
        "Record maintenance event"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let vehicle: Vehicle = ctx.data.require("vehicle")?;
        let similar: Vec<SimilarVehicle> = ctx.data.require("similarVehicles")?;
        let analysis: String = ctx.data.require("aiAnalysis")?;
        let assessment = Assessment::from_metrics(&vehicle.metrics);

        let description = format!(
            "Predictive maintenance for {}: {} service, brake wear {:.1}%, engine temperature {:.1}C",
            vehicle.vehicle_id,
            assessment.urgency.as_str(),
            vehicle.metrics.brake_wear,
            vehicle.metrics.engine_temp
        );
        let embedding = embed_text(ctx, &description).await?;

        let mut event = NewEvent::new(
            WorkflowKind::Maintenance.id(),
            assessment.severity,
            description,
        );
        event.vehicle_id = Some(vehicle.vehicle_id.clone());
        event.metadata = json!({
            "metrics": vehicle.metrics,
            "analysis": analysis,
            "similarCount": similar.len(),
            "riskLevel": assessment.risk_level,
            "urgency": assessment.urgency,
            "confidence": maintenance_confidence(&vehicle.metrics),
        });
        event.embedding = Some(embedding);

        let mut stored = ctx.services.events.insert_event(event).await?;
        stored.embedding = None;
        info!(event_id = %stored.id, severity = %stored.severity, "Recorded maintenance event");

        Ok(StepOutcome::new()
            .payload(json!({ "eventId": stored.id, "severity": stored.severity }))
            .put("maintenanceEvent", &stored)?
            .put("severity", &assessment.severity)?
            .put("urgency", &assessment.urgency)?
            .put("riskLevel", &assessment.risk_level)?)
    }
}

struct GenerateRecommendations;

#[async_trait]
impl PipelineStep for GenerateRecommendations {
    fn name(&self) -> &'static str {
        "Generate recommendations"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let vehicle: Vehicle = ctx.data.require("vehicle")?;
        let analysis: String = ctx.data.require("aiAnalysis")?;

        let recommendations =
            maintenance_recommendations(&vehicle.vehicle_id, &vehicle.metrics, &analysis);
        let confidence = maintenance_confidence(&vehicle.metrics);

        Ok(StepOutcome::new()
            .payload(json!({ "count": recommendations.len(), "confidence": confidence }))
            .put("recommendations", &recommendations)?
            .set("confidence", json!(confidence)))
    }
}

pub struct MaintenanceWorkflow {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Default for MaintenanceWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl MaintenanceWorkflow {
    pub fn new() -> Self {
        Self {
            steps: vec![
                Box::new(GatherTelemetry),
                Box::new(FindSimilarVehicles),
                Box::new(MaintenanceAnalysis),
                Box::new(RecordMaintenanceEvent),
                Box::new(GenerateRecommendations),
            ],
        }
    }
}

impl WorkflowDefinition for MaintenanceWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::Maintenance
    }

    fn steps(&self) -> &[Box<dyn PipelineStep>] {
        &self.steps
    }

    fn recommendations(&self, _params: &WorkflowParams, data: &WorkflowData) -> Vec<String> {
        data.get("recommendations").unwrap_or_default()
    }

    fn confidence(&self, _params: &WorkflowParams, data: &WorkflowData) -> f64 {
        data.f64("confidence").unwrap_or_default()
    }
}
