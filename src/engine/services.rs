//! External collaborators injected into the orchestrator

use std::sync::Arc;

use tracing::{info, warn};

use super::clock::Clock;
use super::error::WorkflowError;
use crate::provider::{
    truncate_for_embedding, CompletionProvider, EmbeddingProvider, GuardedCompleter,
    GuardedEmbedder, OpenAiClient, ProviderErrorPolicy,
};
use crate::store::{EventLog, MemoryStore, SimilarityStore, Vehicle, VehicleStatus, VehicleUpsert};
use crate::workflow::AppConfig;
use crate::workflows::data_source::{DataSource, SyntheticDataSource};

/// Everything a workflow step may call
#[derive(Clone)]
pub struct Services {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completer: Arc<dyn CompletionProvider>,
    pub similarity: Arc<dyn SimilarityStore>,
    pub events: Arc<dyn EventLog>,
    pub data_source: Arc<dyn DataSource>,
    pub clock: Clock,
}

impl Services {
    /// Offline providers over a fresh in-memory store
    pub fn in_memory(seed: Option<u64>) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let services = Self {
            embedder: Arc::new(GuardedEmbedder::offline()),
            completer: Arc::new(GuardedCompleter::offline()),
            similarity: store.clone(),
            events: store.clone(),
            data_source: Arc::new(SyntheticDataSource::from_seed(seed)),
            clock: Clock::new(),
        };
        (services, store)
    }

    /// Wire providers from configuration; missing credentials degrade to
    /// the fallback providers instead of failing.
    pub fn from_config(config: &AppConfig) -> (Self, Arc<MemoryStore>) {
        let policy = config.engine.on_provider_error;
        let (embedder, completer) = guarded_providers(config, policy);

        if !config.store.is_complete() {
            info!(
                "Store credentials incomplete (missing: {}), using in-memory store",
                config.store.missing_fields().join(", ")
            );
        }

        let (mut services, store) = Self::in_memory(config.engine.seed);
        services.embedder = embedder;
        services.completer = completer;
        (services, store)
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_completer(mut self, completer: Arc<dyn CompletionProvider>) -> Self {
        self.completer = completer;
        self
    }

    pub fn with_data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.data_source = data_source;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Populate the event log with `count` vehicles (`TRK-001`, ...) drawn
    /// from the data source, each with an embedding of its metrics
    pub async fn seed_fleet(&self, count: usize) -> Result<Vec<Vehicle>, WorkflowError> {
        let mut vehicles = Vec::with_capacity(count);
        for i in 1..=count {
            let vehicle_id = format!("TRK-{:03}", i);
            let vehicle_type = FLEET_TYPES[(i - 1) % FLEET_TYPES.len()];
            let status = if i % 5 == 0 {
                VehicleStatus::Maintenance
            } else {
                VehicleStatus::Active
            };

            let metrics = self
                .data_source
                .fetch_or_synthesize(&vehicle_id, vehicle_type)
                .await?;
            let embedding = self
                .embedder
                .embed(truncate_for_embedding(&metrics.summary()))
                .await?;
            let vehicle = self
                .events
                .upsert_vehicle(
                    VehicleUpsert::new(vehicle_id)
                        .vehicle_type(vehicle_type)
                        .status(status)
                        .metrics(metrics)
                        .embedding(embedding),
                )
                .await?;
            vehicles.push(vehicle);
        }
        info!("Seeded fleet with {} vehicles", vehicles.len());
        Ok(vehicles)
    }
}

const FLEET_TYPES: [&str; 3] = ["truck", "van", "refrigerated"];

fn guarded_providers(
    config: &AppConfig,
    policy: ProviderErrorPolicy,
) -> (Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>) {
    if !config.provider.has_credentials() {
        return offline_providers();
    }

    match OpenAiClient::from_config(&config.provider) {
        Ok(client) => {
            let client = Arc::new(client);
            info!(
                "Using provider at {} (policy: {:?})",
                config.provider.base_url, policy
            );
            let primary_embedder: Arc<dyn EmbeddingProvider> = client.clone();
            let primary_completer: Arc<dyn CompletionProvider> = client;
            let embedder: Arc<dyn EmbeddingProvider> =
                Arc::new(GuardedEmbedder::new(Some(primary_embedder), policy));
            let completer: Arc<dyn CompletionProvider> =
                Arc::new(GuardedCompleter::new(Some(primary_completer), policy));
            (embedder, completer)
        }
        Err(e) => {
            warn!("Provider client unavailable, using fallbacks: {}", e);
            offline_providers()
        }
    }
}

fn offline_providers() -> (Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>) {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(GuardedEmbedder::offline());
    let completer: Arc<dyn CompletionProvider> = Arc::new(GuardedCompleter::offline());
    (embedder, completer)
}
