//! Similarity store and event log
//!
//! The workflows persist three kinds of entities, each optionally carrying an
//! embedding:
//! - `Vehicle` (natural key `vehicle_id`)
//! - `RouteRecord` (natural key `route_id`)
//! - `LogisticsEvent` (generated id, append-only)
//!
//! `EventLog` covers lookups and writes, `SimilarityStore` answers
//! k-nearest-neighbour queries by cosine distance. `MemoryStore` implements
//! both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub mod memory;
pub mod vector;

pub use memory::MemoryStore;
pub use vector::{cosine_distance, rank_by_distance};

/// The three searchable tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityTable {
    Event,
    Vehicle,
    Route,
}

impl fmt::Display for SimilarityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SimilarityTable::Event => "events",
            SimilarityTable::Vehicle => "vehicles",
            SimilarityTable::Route => "routes",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Vector for {table} has {actual} dimensions, expected {expected}")]
    DimensionMismatch {
        table: SimilarityTable,
        expected: usize,
        actual: usize,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VehicleStatus {
    #[default]
    Active,
    Idle,
    Maintenance,
    Offline,
}

impl VehicleStatus {
    /// Whether the vehicle can be dispatched
    pub fn is_available(&self) -> bool {
        matches!(self, VehicleStatus::Active | VehicleStatus::Idle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Vehicle telemetry snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct VehicleMetrics {
    /// Percent, 0-100
    pub battery_level: f64,
    /// Degrees Celsius
    pub engine_temp: f64,
    /// PSI
    pub oil_pressure: f64,
    /// Percent, 0-100
    pub brake_wear: f64,
    /// PSI
    pub tire_pressure: f64,
    pub fuel_efficiency: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emissions: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_temp: Option<f64>,
    /// Percent, 0-100
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coolant_level: Option<f64>,
}

impl VehicleMetrics {
    /// Text form used for embeddings and prompts
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("battery {:.1}%", self.battery_level),
            format!("engine temperature {:.1}C", self.engine_temp),
            format!("oil pressure {:.1} PSI", self.oil_pressure),
            format!("brake wear {:.1}%", self.brake_wear),
            format!("tire pressure {:.1} PSI", self.tire_pressure),
            format!("fuel efficiency {:.1}", self.fuel_efficiency),
        ];
        if let Some(v) = self.vibration {
            parts.push(format!("vibration {:.2}", v));
        }
        if let Some(v) = self.emissions {
            parts.push(format!("emissions {:.1}", v));
        }
        if let Some(v) = self.transmission_temp {
            parts.push(format!("transmission temperature {:.1}C", v));
        }
        if let Some(v) = self.coolant_level {
            parts.push(format!("coolant {:.1}%", v));
        }
        parts.join(", ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub vehicle_id: String,
    pub vehicle_type: String,
    pub status: VehicleStatus,
    pub location: Option<String>,
    pub metrics: VehicleMetrics,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

/// Partial vehicle update; `None` fields keep their stored value
#[derive(Debug, Clone, Default)]
pub struct VehicleUpsert {
    pub vehicle_id: String,
    pub vehicle_type: Option<String>,
    pub status: Option<VehicleStatus>,
    pub location: Option<String>,
    pub metrics: Option<VehicleMetrics>,
    pub embedding: Option<Vec<f32>>,
}

impl VehicleUpsert {
    pub fn new(vehicle_id: impl Into<String>) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            ..Default::default()
        }
    }

    pub fn vehicle_type(mut self, vehicle_type: impl Into<String>) -> Self {
        self.vehicle_type = Some(vehicle_type.into());
        self
    }

    pub fn status(mut self, status: VehicleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn metrics(mut self, metrics: VehicleMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub route_id: String,
    pub origin: String,
    pub destination: String,
    pub waypoints: Vec<String>,
    pub distance_km: f64,
    pub estimated_minutes: u32,
    pub fuel_cost: f64,
    pub optimization_score: Option<f64>,
    pub ai_analysis: Option<String>,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub updated_at: DateTime<Utc>,
}

/// Partial route update; `None` fields keep their stored value
#[derive(Debug, Clone, Default)]
pub struct RouteUpsert {
    pub route_id: String,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub waypoints: Option<Vec<String>>,
    pub distance_km: Option<f64>,
    pub estimated_minutes: Option<u32>,
    pub fuel_cost: Option<f64>,
    pub optimization_score: Option<f64>,
    pub ai_analysis: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticsEvent {
    pub id: String,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub metadata: Value,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

/// Event to append; the log assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub metadata: Value,
    pub embedding: Option<Vec<f32>>,
}

impl NewEvent {
    pub fn new(
        event_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            severity,
            description: description.into(),
            vehicle_id: None,
            route_id: None,
            metadata: Value::Null,
            embedding: None,
        }
    }
}

/// One similarity search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityHit<T> {
    pub entity: T,
    /// Cosine distance, 0 means identical direction
    pub distance: f32,
}

impl<T> SimilarityHit<T> {
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// Entity lookups and writes
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, StoreError>;

    async fn upsert_vehicle(&self, update: VehicleUpsert) -> Result<Vehicle, StoreError>;

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError>;

    /// Vehicles with status `active` or `idle`, at most `limit`
    async fn available_vehicles(&self, limit: usize) -> Result<Vec<Vehicle>, StoreError>;

    async fn upsert_route(&self, update: RouteUpsert) -> Result<RouteRecord, StoreError>;

    async fn insert_event(&self, event: NewEvent) -> Result<LogisticsEvent, StoreError>;

    async fn list_events(&self, event_type: Option<&str>)
        -> Result<Vec<LogisticsEvent>, StoreError>;
}

/// Nearest-neighbour queries; results are ordered by ascending cosine
/// distance, hold at most `k` entries, and skip entities without a vector.
#[async_trait]
pub trait SimilarityStore: Send + Sync {
    async fn find_similar_events(
        &self,
        vector: &[f32],
        event_type: Option<&str>,
        k: usize,
    ) -> Result<Vec<SimilarityHit<LogisticsEvent>>, StoreError>;

    async fn find_similar_vehicles(
        &self,
        vector: &[f32],
        vehicle_type: Option<&str>,
        k: usize,
    ) -> Result<Vec<SimilarityHit<Vehicle>>, StoreError>;

    async fn find_similar_routes(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit<RouteRecord>>, StoreError>;
}
