//! Telemetry and route inputs
//!
//! Production wiring points `DataSource` at a real telemetry feed. The
//! synthetic source produces bounded random values from an explicit seed, so
//! a seeded run is reproducible.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::engine::error::WorkflowError;
use crate::store::VehicleMetrics;

const WAYPOINT_POOL: [&str; 8] = [
    "Hartford Cross-Dock",
    "Providence Depot",
    "Worcester Fuel Stop",
    "New Haven Hub",
    "Springfield Transfer",
    "Stamford Relay",
    "Albany Yard",
    "Manchester Terminal",
];

/// Route figures before optimization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDraft {
    pub waypoints: Vec<String>,
    pub distance_km: f64,
    pub estimated_minutes: u32,
    pub fuel_cost: f64,
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Metrics for a vehicle that has no stored record
    async fn fetch_or_synthesize(
        &self,
        vehicle_id: &str,
        vehicle_type: &str,
    ) -> Result<VehicleMetrics, WorkflowError>;

    /// Route figures when the caller did not supply them
    async fn synthesize_route(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<RouteDraft, WorkflowError>;
}

/// Bounded random telemetry
#[derive(Debug)]
pub struct SyntheticDataSource {
    rng: Mutex<StdRng>,
    extended_metrics: bool,
}

impl SyntheticDataSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            extended_metrics: true,
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            extended_metrics: true,
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map(Self::seeded).unwrap_or_else(Self::from_entropy)
    }

    /// Only the six core metrics
    pub fn without_extended_metrics(mut self) -> Self {
        self.extended_metrics = false;
        self
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[async_trait]
impl DataSource for SyntheticDataSource {
    async fn fetch_or_synthesize(
        &self,
        _vehicle_id: &str,
        _vehicle_type: &str,
    ) -> Result<VehicleMetrics, WorkflowError> {
        let mut rng = self.rng.lock().await;
        let mut metrics = VehicleMetrics {
            battery_level: round1(rng.gen_range(0.0..=100.0)),
            engine_temp: round1(rng.gen_range(85.0..=105.0)),
            oil_pressure: round1(rng.gen_range(30.0..=40.0)),
            brake_wear: round1(rng.gen_range(0.0..=100.0)),
            tire_pressure: round1(rng.gen_range(32.0..=36.0)),
            fuel_efficiency: round1(rng.gen_range(8.0..=12.0)),
            ..Default::default()
        };

        if self.extended_metrics {
            metrics.vibration = Some((rng.gen_range(0.1..=2.5f64) * 100.0).round() / 100.0);
            metrics.emissions = Some(round1(rng.gen_range(120.0..=280.0)));
            metrics.transmission_temp = Some(round1(rng.gen_range(70.0..=110.0)));
            metrics.coolant_level = Some(round1(rng.gen_range(20.0..=100.0)));
        }

        Ok(metrics)
    }

    async fn synthesize_route(
        &self,
        _origin: &str,
        _destination: &str,
    ) -> Result<RouteDraft, WorkflowError> {
        let mut rng = self.rng.lock().await;
        let waypoint_count = rng.gen_range(0..=3);
        let mut waypoints: Vec<String> = Vec::with_capacity(waypoint_count);
        while waypoints.len() < waypoint_count {
            let candidate = WAYPOINT_POOL[rng.gen_range(0..WAYPOINT_POOL.len())];
            if !waypoints.iter().any(|w| w == candidate) {
                waypoints.push(candidate.to_string());
            }
        }

        Ok(RouteDraft {
            waypoints,
            distance_km: round1(rng.gen_range(50.0..=500.0)),
            estimated_minutes: rng.gen_range(60..=480),
            fuel_cost: (rng.gen_range(50.0..=300.0f64) * 100.0).round() / 100.0,
        })
    }
}
