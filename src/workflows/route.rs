//! Route Optimization workflow

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::helpers::{embed_text, first_sentence, render_prompt, round1, similarity_pct};
use crate::engine::{PipelineStep, StepContext, StepOutcome, WorkflowDefinition, WorkflowError};
use crate::store::{NewEvent, RouteUpsert, Severity};
use crate::workflow::{WorkflowData, WorkflowKind, WorkflowParams};

const SYSTEM_INSTRUCTION: &str = "You are a logistics route planner. Recommend changes that reduce travel time and fuel cost without compromising driver or cargo safety.";

const OPTIMIZATION_TEMPLATE: &str = "Optimize the delivery route from {{origin}} to {{destination}}.

Waypoints: {{#if waypoints}}{{#each waypoints}}{{#unless @first}}, {{/unless}}{{this}}{{/each}}{{else}}none{{/if}}
Distance: {{distance_km}} km
Estimated time: {{estimated_minutes}} minutes
Fuel cost: ${{fuel_cost}}

{{#if similar}}Similar past routes:
{{#each similar}}- {{origin}} to {{destination}}: {{distance_km}} km, {{estimated_minutes}} minutes{{#if optimization_score}}, score {{optimization_score}}%{{/if}}
{{/each}}{{else}}No similar routes on record.
{{/if}}
Suggest waypoint ordering, timing and fuel savings.";

/// Synthetic scores fall in `BASE_SCORE..=BASE_SCORE + SCORE_SPREAD - 1`
const BASE_SCORE: f64 = 85.0;
const SCORE_SPREAD: u8 = 16;

/// Route inputs after defaults are filled in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    pub route_id: String,
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<String>,
    pub distance_km: f64,
    pub estimated_minutes: u32,
    pub fuel_cost: f64,
    pub synthesized: bool,
}

impl RoutePlan {
    /// Text form used for embeddings
    pub fn summary(&self) -> String {
        let via = if self.waypoints.is_empty() {
            "direct".to_string()
        } else {
            format!("via {}", self.waypoints.join(", "))
        };
        format!(
            "Route from {} to {} {}: {:.1} km, {} minutes, fuel cost ${:.2}",
            self.origin,
            self.destination,
            via,
            self.distance_km,
            self.estimated_minutes,
            self.fuel_cost
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarRoute {
    pub route_id: String,
    pub origin: String,
    pub destination: String,
    pub distance_km: f64,
    pub estimated_minutes: u32,
    pub optimization_score: Option<f64>,
    pub similarity: f64,
}

fn route_digest(origin: &str, destination: &str) -> [u8; 32] {
    Sha256::digest(format!("{}|{}", origin.trim(), destination.trim()).as_bytes()).into()
}

/// Stable id for an origin/destination pair
pub fn route_id_for(origin: &str, destination: &str) -> String {
    format!("ROUTE-{}", hex::encode(&route_digest(origin, destination)[..4]).to_uppercase())
}

/// Deterministic score in 85..=100 derived from the route endpoints
pub fn synthetic_score(origin: &str, destination: &str) -> f64 {
    BASE_SCORE + f64::from(route_digest(origin, destination)[4] % SCORE_SPREAD)
}

pub fn route_confidence(score: f64) -> f64 {
    score.clamp(0.0, 100.0)
}

pub fn route_recommendations(plan: &RoutePlan, score: f64, analysis: &str) -> Vec<String> {
    let band = if score > 90.0 {
        "Excellent route efficiency, keep the current plan"
    } else if score > 80.0 {
        "Good route efficiency, minor adjustments may save fuel"
    } else {
        "Route needs optimization, review waypoints and departure times"
    };

    vec![
        format!(
            "Optimization score: {:.0}% for {} → {}",
            score, plan.origin, plan.destination
        ),
        format!(
            "Estimated time: {} minutes over {:.1} km",
            plan.estimated_minutes, plan.distance_km
        ),
        format!("Fuel cost: ${:.2}", plan.fuel_cost),
        band.to_string(),
        format!("AI insight: {}", first_sentence(analysis)),
    ]
}

fn optimization_score(params: &WorkflowParams, plan: &RoutePlan) -> f64 {
    match params {
        WorkflowParams::RouteOptimization {
            optimization_score: Some(score),
            ..
        } => score.clamp(0.0, 100.0),
        _ => synthetic_score(&plan.origin, &plan.destination),
    }
}

/// Supplied figures must be finite and non-negative
fn validate_route_figures(params: &WorkflowParams) -> Result<(), WorkflowError> {
    let WorkflowParams::RouteOptimization {
        distance_km,
        fuel_cost,
        optimization_score,
        ..
    } = params
    else {
        return Ok(());
    };

    for (field, value) in [
        ("distance_km", distance_km),
        ("fuel_cost", fuel_cost),
        ("optimization_score", optimization_score),
    ] {
        if let Some(value) = value {
            if !value.is_finite() || *value < 0.0 {
                return Err(WorkflowError::InvalidParams(format!(
                    "{} must be a finite, non-negative number (got {})",
                    field, value
                )));
            }
        }
    }
    Ok(())
}

struct CollectRouteData;

#[async_trait]
impl PipelineStep for CollectRouteData {
    fn name(&self) -> &'static str {
        "Collect route data"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let WorkflowParams::RouteOptimization {
            origin,
            destination,
            waypoints,
            distance_km,
            estimated_minutes,
            fuel_cost,
            ..
        } = ctx.params
        else {
            return Err(WorkflowError::InvalidParams(format!(
                "expected route parameters, got {}",
                ctx.params.kind()
            )));
        };
        validate_route_figures(ctx.params)?;

        let complete = waypoints.is_some()
            && distance_km.is_some()
            && estimated_minutes.is_some()
            && fuel_cost.is_some();
        let draft = if complete {
            None
        } else {
            Some(
                ctx.services
                    .data_source
                    .synthesize_route(origin, destination)
                    .await?,
            )
        };

        let plan = RoutePlan {
            route_id: route_id_for(origin, destination),
            origin: origin.clone(),
            destination: destination.clone(),
            waypoints: waypoints
                .clone()
                .or_else(|| draft.as_ref().map(|d| d.waypoints.clone()))
                .unwrap_or_default(),
            distance_km: round1(
                distance_km
                    .or(draft.as_ref().map(|d| d.distance_km))
                    .unwrap_or_default(),
            ),
            estimated_minutes: estimated_minutes
                .or(draft.as_ref().map(|d| d.estimated_minutes))
                .unwrap_or_default(),
            fuel_cost: fuel_cost
                .or(draft.as_ref().map(|d| d.fuel_cost))
                .unwrap_or_default(),
            synthesized: draft.is_some(),
        };
        let vector = embed_text(ctx, &plan.summary()).await?;

        Ok(StepOutcome::new()
            .payload(json!({ "routeId": plan.route_id, "synthesized": plan.synthesized }))
            .put("route", &plan)?
            .vector("route", vector))
    }
}

struct FindSimilarRoutes;

#[async_trait]
impl PipelineStep for FindSimilarRoutes {
    fn name(&self) -> &'static str {
        "Find similar routes"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let vector = ctx.data.require_vector("route")?;
        let hits = ctx
            .services
            .similarity
            .find_similar_routes(vector, ctx.config.similar_limit)
            .await?;

        let similar: Vec<SimilarRoute> = hits
            .into_iter()
            .map(|h| SimilarRoute {
                similarity: similarity_pct(h.distance),
                route_id: h.entity.route_id,
                origin: h.entity.origin,
                destination: h.entity.destination,
                distance_km: h.entity.distance_km,
                estimated_minutes: h.entity.estimated_minutes,
                optimization_score: h.entity.optimization_score,
            })
            .collect();
        debug!(count = similar.len(), "Similar routes found");

        Ok(StepOutcome::new()
            .payload(json!({ "count": similar.len() }))
            .put("similarRoutes", &similar)?)
    }
}

struct RouteOptimization;

#[async_trait]
impl PipelineStep for RouteOptimization {
    fn name(&self) -> &'static str {
        "AI route optimization"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let plan: RoutePlan = ctx.data.require("route")?;
        let similar: Vec<SimilarRoute> = ctx.data.require("similarRoutes")?;

        let prompt = render_prompt(
            OPTIMIZATION_TEMPLATE,
            &json!({
                "origin": plan.origin,
                "destination": plan.destination,
                "waypoints": plan.waypoints,
                "distance_km": plan.distance_km,
                "estimated_minutes": plan.estimated_minutes,
                "fuel_cost": format!("{:.2}", plan.fuel_cost),
                "similar": similar,
            }),
        )?;
        let optimization = ctx
            .services
            .completer
            .complete(&prompt, Some(SYSTEM_INSTRUCTION))
            .await?;

        Ok(StepOutcome::new()
            .payload(json!({ "chars": optimization.chars().count() }))
            .set("aiOptimization", json!(optimization)))
    }
}

struct PersistOptimization;

#[async_trait]
impl PipelineStep for PersistOptimization {
    fn name(&self) -> &'static str {
        "Persist optimization"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let plan: RoutePlan = ctx.data.require("route")?;
        let similar: Vec<SimilarRoute> = ctx.data.require("similarRoutes")?;
        let optimization: String = ctx.data.require("aiOptimization")?;
        let score = optimization_score(ctx.params, &plan);

        let route_text = format!("{}. {}", plan.summary(), optimization);
        let route_embedding = embed_text(ctx, &route_text).await?;
        let mut record = ctx
            .services
            .events
            .upsert_route(RouteUpsert {
                route_id: plan.route_id.clone(),
                origin: Some(plan.origin.clone()),
                destination: Some(plan.destination.clone()),
                waypoints: Some(plan.waypoints.clone()),
                distance_km: Some(plan.distance_km),
                estimated_minutes: Some(plan.estimated_minutes),
                fuel_cost: Some(plan.fuel_cost),
                optimization_score: Some(score),
                ai_analysis: Some(optimization),
                embedding: Some(route_embedding),
            })
            .await?;
        record.embedding = None;

        let description = format!(
            "Route {} optimized: {} → {}, score {:.0}%",
            plan.route_id, plan.origin, plan.destination, score
        );
        let event_embedding = embed_text(ctx, &description).await?;
        let mut event = NewEvent::new(
            WorkflowKind::RouteOptimization.id(),
            Severity::Low,
            description,
        );
        event.route_id = Some(plan.route_id.clone());
        event.metadata = json!({
            "optimizationScore": score,
            "distanceKm": plan.distance_km,
            "estimatedMinutes": plan.estimated_minutes,
            "fuelCost": plan.fuel_cost,
            "similarCount": similar.len(),
        });
        event.embedding = Some(event_embedding);

        let mut stored = ctx.services.events.insert_event(event).await?;
        stored.embedding = None;
        info!(route_id = %plan.route_id, score, "Persisted route optimization");

        Ok(StepOutcome::new()
            .payload(json!({ "routeId": record.route_id, "eventId": stored.id }))
            .set("optimizationScore", json!(score))
            .put("routeRecord", &record)?
            .put("optimizationEvent", &stored)?)
    }
}

struct GenerateRecommendations;

#[async_trait]
impl PipelineStep for GenerateRecommendations {
    fn name(&self) -> &'static str {
        "Generate recommendations"
    }

    async fn execute(&self, ctx: &StepContext<'_>) -> Result<StepOutcome, WorkflowError> {
        let plan: RoutePlan = ctx.data.require("route")?;
        let optimization: String = ctx.data.require("aiOptimization")?;
        let score: f64 = ctx.data.require("optimizationScore")?;

        let recommendations = route_recommendations(&plan, score, &optimization);
        let confidence = route_confidence(score);

        Ok(StepOutcome::new()
            .payload(json!({ "count": recommendations.len(), "confidence": confidence }))
            .put("recommendations", &recommendations)?
            .set("confidence", json!(confidence)))
    }
}

pub struct RouteWorkflow {
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Default for RouteWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteWorkflow {
    pub fn new() -> Self {
        Self {
            steps: vec![
                Box::new(CollectRouteData),
                Box::new(FindSimilarRoutes),
                Box::new(RouteOptimization),
                Box::new(PersistOptimization),
                Box::new(GenerateRecommendations),
            ],
        }
    }
}

impl WorkflowDefinition for RouteWorkflow {
    fn kind(&self) -> WorkflowKind {
        WorkflowKind::RouteOptimization
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
