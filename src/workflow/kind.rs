//! Workflow kinds and their input parameters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    #[serde(rename = "predictive_maintenance")]
    Maintenance,
    RouteOptimization,
    EmergencyResponse,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [
        WorkflowKind::Maintenance,
        WorkflowKind::RouteOptimization,
        WorkflowKind::EmergencyResponse,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            WorkflowKind::Maintenance => "predictive_maintenance",
            WorkflowKind::RouteOptimization => "route_optimization",
            WorkflowKind::EmergencyResponse => "emergency_response",
        }
    }

    /// Number of steps in a complete run
    pub fn pipeline_len(&self) -> usize {
        match self {
            WorkflowKind::Maintenance => 5,
            WorkflowKind::RouteOptimization => 5,
            WorkflowKind::EmergencyResponse => 4,
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for WorkflowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "predictive_maintenance" | "maintenance" => Ok(WorkflowKind::Maintenance),
            "route_optimization" | "route" => Ok(WorkflowKind::RouteOptimization),
            "emergency_response" | "emergency" => Ok(WorkflowKind::EmergencyResponse),
            other => Err(format!("Unknown workflow kind: {}", other)),
        }
    }
}

/// Inputs for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowParams {
    #[serde(rename = "predictive_maintenance")]
    Maintenance {
        vehicle_id: String,
        #[serde(default)]
        vehicle_type: Option<String>,
    },
    RouteOptimization {
        origin: String,
        destination: String,
        #[serde(default)]
        waypoints: Option<Vec<String>>,
        #[serde(default)]
        distance_km: Option<f64>,
        #[serde(default)]
        estimated_minutes: Option<u32>,
        #[serde(default)]
        fuel_cost: Option<f64>,
        #[serde(default)]
        optimization_score: Option<f64>,
    },
    EmergencyResponse {
        emergency_type: String,
        location: String,
    },
}

impl WorkflowParams {
    pub fn maintenance(vehicle_id: impl Into<String>) -> Self {
        WorkflowParams::Maintenance {
            vehicle_id: vehicle_id.into(),
            vehicle_type: None,
        }
    }

    pub fn route(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        WorkflowParams::RouteOptimization {
            origin: origin.into(),
            destination: destination.into(),
            waypoints: None,
            distance_km: None,
            estimated_minutes: None,
            fuel_cost: None,
            optimization_score: None,
        }
    }

    pub fn emergency(emergency_type: impl Into<String>, location: impl Into<String>) -> Self {
        WorkflowParams::EmergencyResponse {
            emergency_type: emergency_type.into(),
            location: location.into(),
        }
    }

    pub fn kind(&self) -> WorkflowKind {
        match self {
            WorkflowParams::Maintenance { .. } => WorkflowKind::Maintenance,
            WorkflowParams::RouteOptimization { .. } => WorkflowKind::RouteOptimization,
            WorkflowParams::EmergencyResponse { .. } => WorkflowKind::EmergencyResponse,
        }
    }

    /// The entity a run is about, used in the workflow id
    pub fn subject(&self) -> String {
        match self {
            WorkflowParams::Maintenance { vehicle_id, .. } => vehicle_id.clone(),
            WorkflowParams::RouteOptimization {
                origin,
                destination,
                ..
            } => format!("{}-{}", initials(origin), initials(destination)),
            WorkflowParams::EmergencyResponse { emergency_type, .. } => {
                initials(emergency_type)
            }
        }
    }
}

fn initials(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter_map(|w| w.chars().next())
        .take(6)
        .collect::<String>()
        .to_ascii_uppercase()
}

fn slug(text: &str) -> String {
    let slug: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}

/// `{kind}_{subject}_{timestamp_ms}_{suffix}`
///
/// The random suffix keeps ids distinct for runs that share a subject and a
/// millisecond, which is every run under a fixed virtual clock.
pub fn generate_workflow_id(kind: WorkflowKind, subject: &str, at: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}_{}",
        kind.id(),
        slug(subject),
        at.timestamp_millis(),
        &suffix[..ID_SUFFIX_LEN]
    )
}

const ID_SUFFIX_LEN: usize = 8;
