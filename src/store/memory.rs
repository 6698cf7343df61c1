//! In-memory implementation of `EventLog` and `SimilarityStore`

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{
    rank_by_distance, EventLog, LogisticsEvent, NewEvent, RouteRecord, RouteUpsert,
    SimilarityHit, SimilarityStore, SimilarityTable, StoreError, Vehicle, VehicleMetrics,
    VehicleUpsert,
};
use crate::provider::EMBEDDING_DIMENSION;

#[derive(Debug, Default)]
struct MemoryState {
    vehicles: Vec<Vehicle>,
    routes: Vec<RouteRecord>,
    events: Vec<LogisticsEvent>,
}

/// Process-local store; insertion order is preserved for ties and listings
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

fn check_vector(table: SimilarityTable, vector: Option<&[f32]>) -> Result<(), StoreError> {
    match vector {
        Some(v) if v.len() != EMBEDDING_DIMENSION => Err(StoreError::DimensionMismatch {
            table,
            expected: EMBEDDING_DIMENSION,
            actual: v.len(),
        }),
        _ => Ok(()),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn vehicle_count(&self) -> usize {
        self.state.read().await.vehicles.len()
    }

    pub async fn event_count(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn get_route(&self, route_id: &str) -> Option<RouteRecord> {
        let state = self.state.read().await;
        state.routes.iter().find(|r| r.route_id == route_id).cloned()
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    async fn get_vehicle(&self, vehicle_id: &str) -> Result<Option<Vehicle>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .vehicles
            .iter()
            .find(|v| v.vehicle_id == vehicle_id)
            .cloned())
    }

    async fn upsert_vehicle(&self, update: VehicleUpsert) -> Result<Vehicle, StoreError> {
        check_vector(SimilarityTable::Vehicle, update.embedding.as_deref())?;
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(existing) = state
            .vehicles
            .iter_mut()
            .find(|v| v.vehicle_id == update.vehicle_id)
        {
            if let Some(vehicle_type) = update.vehicle_type {
                existing.vehicle_type = vehicle_type;
            }
            if let Some(status) = update.status {
                existing.status = status;
            }
            if let Some(location) = update.location {
                existing.location = Some(location);
            }
            if let Some(metrics) = update.metrics {
                existing.metrics = metrics;
            }
            if let Some(embedding) = update.embedding {
                existing.embedding = Some(embedding);
            }
            existing.updated_at = now;
            debug!(vehicle_id = %existing.vehicle_id, "updated vehicle");
            return Ok(existing.clone());
        }

        let vehicle = Vehicle {
            vehicle_id: update.vehicle_id,
            vehicle_type: update.vehicle_type.unwrap_or_else(|| "truck".to_string()),
            status: update.status.unwrap_or_default(),
            location: update.location,
            metrics: update.metrics.unwrap_or_else(VehicleMetrics::default),
            embedding: update.embedding,
            updated_at: now,
        };
        debug!(vehicle_id = %vehicle.vehicle_id, "inserted vehicle");
        state.vehicles.push(vehicle.clone());
        Ok(vehicle)
    }

    async fn list_vehicles(&self) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self.state.read().await.vehicles.clone())
    }

    async fn available_vehicles(&self, limit: usize) -> Result<Vec<Vehicle>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .vehicles
            .iter()
            .filter(|v| v.status.is_available())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert_route(&self, update: RouteUpsert) -> Result<RouteRecord, StoreError> {
        check_vector(SimilarityTable::Route, update.embedding.as_deref())?;
        let mut state = self.state.write().await;
        let now = Utc::now();

        if let Some(existing) = state
            .routes
            .iter_mut()
            .find(|r| r.route_id == update.route_id)
        {
            if let Some(origin) = update.origin {
                existing.origin = origin;
            }
            if let Some(destination) = update.destination {
                existing.destination = destination;
            }
            if let Some(waypoints) = update.waypoints {
                existing.waypoints = waypoints;
            }
            if let Some(distance) = update.distance_km {
                existing.distance_km = distance;
            }
            if let Some(minutes) = update.estimated_minutes {
                existing.estimated_minutes = minutes;
            }
            if let Some(cost) = update.fuel_cost {
                existing.fuel_cost = cost;
            }
            if let Some(score) = update.optimization_score {
                existing.optimization_score = Some(score);
            }
            if let Some(analysis) = update.ai_analysis {
                existing.ai_analysis = Some(analysis);
            }
            if let Some(embedding) = update.embedding {
                existing.embedding = Some(embedding);
            }
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let route = RouteRecord {
            route_id: update.route_id,
            origin: update.origin.unwrap_or_default(),
            destination: update.destination.unwrap_or_default(),
            waypoints: update.waypoints.unwrap_or_default(),
            distance_km: update.distance_km.unwrap_or_default(),
            estimated_minutes: update.estimated_minutes.unwrap_or_default(),
            fuel_cost: update.fuel_cost.unwrap_or_default(),
            optimization_score: update.optimization_score,
            ai_analysis: update.ai_analysis,
            embedding: update.embedding,
            updated_at: now,
        };
        state.routes.push(route.clone());
        Ok(route)
    }

    async fn insert_event(&self, event: NewEvent) -> Result<LogisticsEvent, StoreError> {
        check_vector(SimilarityTable::Event, event.embedding.as_deref())?;
        let stored = LogisticsEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: event.event_type,
            severity: event.severity,
            description: event.description,
            vehicle_id: event.vehicle_id,
            route_id: event.route_id,
            metadata: event.metadata,
            embedding: event.embedding,
            created_at: Utc::now(),
        };
        debug!(event_id = %stored.id, event_type = %stored.event_type, "inserted event");
        self.state.write().await.events.push(stored.clone());
        Ok(stored)
    }

    async fn list_events(
        &self,
        event_type: Option<&str>,
    ) -> Result<Vec<LogisticsEvent>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SimilarityStore for MemoryStore {
    async fn find_similar_events(
        &self,
        vector: &[f32],
        event_type: Option<&str>,
        k: usize,
    ) -> Result<Vec<SimilarityHit<LogisticsEvent>>, StoreError> {
        check_vector(SimilarityTable::Event, Some(vector))?;
        let state = self.state.read().await;
        let candidates = state
            .events
            .iter()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .map(|e| (e, e.embedding.as_deref()));
        Ok(rank_by_distance(vector, candidates, k))
    }

    async fn find_similar_vehicles(
        &self,
        vector: &[f32],
        vehicle_type: Option<&str>,
        k: usize,
    ) -> Result<Vec<SimilarityHit<Vehicle>>, StoreError> {
        check_vector(SimilarityTable::Vehicle, Some(vector))?;
        let state = self.state.read().await;
        let candidates = state
            .vehicles
            .iter()
            .filter(|v| vehicle_type.map_or(true, |t| v.vehicle_type == t))
            .map(|v| (v, v.embedding.as_deref()));
        Ok(rank_by_distance(vector, candidates, k))
    }

    async fn find_similar_routes(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityHit<RouteRecord>>, StoreError> {
        check_vector(SimilarityTable::Route, Some(vector))?;
        let state = self.state.read().await;
        let candidates = state.routes.iter().map(|r| (r, r.embedding.as_deref()));
        Ok(rank_by_distance(vector, candidates, k))
    }
}
