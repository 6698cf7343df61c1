#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fleet_workflows::provider::FallbackEmbedder;
use fleet_workflows::store::VehicleMetrics;
use fleet_workflows::workflows::RouteDraft;
use fleet_workflows::{
    CompletionProvider, DataSource, EmbeddingProvider, EngineConfig, MemoryStore, Orchestrator,
    ProviderError, Services, StepStatus, WorkflowError, WorkflowResult,
};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_config(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("fleet.yaml");
    fs::write(&path, content).expect("Failed to write fleet.yaml");
    path
}

/// Offline providers, seeded synthetic data, fresh in-memory store
pub fn offline_orchestrator(seed: u64) -> (Orchestrator, Arc<MemoryStore>) {
    let (services, store) = Services::in_memory(Some(seed));
    (Orchestrator::new(services, EngineConfig::default()), store)
}

pub fn orchestrator_with(services: Services) -> Orchestrator {
    Orchestrator::new(services, EngineConfig::default())
}

pub fn metrics_with_brake_wear(brake_wear: f64) -> VehicleMetrics {
    VehicleMetrics {
        battery_level: 75.0,
        engine_temp: 90.0,
        oil_pressure: 35.0,
        brake_wear,
        tire_pressure: 34.0,
        fuel_efficiency: 10.0,
        ..Default::default()
    }
}

/// Completion provider that always fails, as an unreachable endpoint would
pub struct FailingCompleter;

#[async_trait]
impl CompletionProvider for FailingCompleter {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::Http {
            status: 503,
            message: "service unavailable".to_string(),
        })
    }
}

/// Completion provider that answers with a fixed text
pub struct CannedCompleter(pub &'static str);

#[async_trait]
impl CompletionProvider for CannedCompleter {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        Ok(self.0.to_string())
    }
}

/// Deterministic embedder that counts calls and checks every input length
#[derive(Default)]
pub struct CountingEmbedder {
    inner: FallbackEmbedder,
    calls: AtomicUsize,
    longest_input: AtomicUsize,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn longest_input(&self) -> usize {
        self.longest_input.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for CountingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.longest_input
            .fetch_max(text.chars().count(), Ordering::SeqCst);
        Ok(self.inner.vector_for(text))
    }
}

/// Data source returning the same telemetry and route every time
pub struct FixedDataSource {
    pub metrics: VehicleMetrics,
}

impl FixedDataSource {
    pub fn with_brake_wear(brake_wear: f64) -> Self {
        Self {
            metrics: metrics_with_brake_wear(brake_wear),
        }
    }
}

#[async_trait]
impl DataSource for FixedDataSource {
    async fn fetch_or_synthesize(
        &self,
        _vehicle_id: &str,
        _vehicle_type: &str,
    ) -> Result<VehicleMetrics, WorkflowError> {
        Ok(self.metrics.clone())
    }

    async fn synthesize_route(
        &self,
        _origin: &str,
        _destination: &str,
    ) -> Result<RouteDraft, WorkflowError> {
        Ok(RouteDraft {
            waypoints: vec!["Hartford Cross-Dock".to_string()],
            distance_km: 346.2,
            estimated_minutes: 245,
            fuel_cost: 128.5,
        })
    }
}

/// Invariants every result must satisfy regardless of outcome
pub fn assert_result_invariants(result: &WorkflowResult) {
    for (i, step) in result.steps.iter().enumerate() {
        assert_eq!(step.index, i + 1, "step indices must be 1-based and gapless");
    }
    assert!(result.steps.len() <= result.kind.pipeline_len());

    let all_completed = result
        .steps
        .iter()
        .all(|s| s.status == StepStatus::Completed);
    assert_eq!(
        result.success,
        result.steps.len() == result.kind.pipeline_len() && all_completed
    );
    assert_eq!(!result.recommendations.is_empty(), result.success);

    if !result.success {
        let last = result.steps.last().expect("a failed run records its failed step");
        assert_eq!(last.status, StepStatus::Failed);
        assert!(!last.error.as_deref().unwrap_or_default().is_empty());
        assert!(result.steps[..result.steps.len() - 1]
            .iter()
            .all(|s| s.status == StepStatus::Completed));
        assert_eq!(result.confidence, 0.0);
    } else {
        assert!((0.0..=100.0).contains(&result.confidence));
    }
}
