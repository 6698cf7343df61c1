mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::*;
use fleet_workflows::provider::{GuardedCompleter, EMBEDDING_DIMENSION, MAX_EMBEDDING_INPUT_CHARS};
use fleet_workflows::store::{EventLog, Severity, VehicleStatus, VehicleUpsert};
use fleet_workflows::{
    AppConfig, Clock, CompletionProvider, EmbeddingProvider, EngineConfig, Orchestrator,
    ProgressEvent, ProviderError, ProviderErrorPolicy, Services, StepStatus, WorkflowKind,
    WorkflowParams,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Cancels the run's token from inside the AI step
struct CancellingCompleter(CancellationToken);

#[async_trait]
impl CompletionProvider for CancellingCompleter {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        self.0.cancel();
        Ok("Proceed carefully.".to_string())
    }
}

struct SlowCompleter(Duration);

#[async_trait]
impl CompletionProvider for SlowCompleter {
    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
    ) -> Result<String, ProviderError> {
        tokio::time::sleep(self.0).await;
        Ok("Done.".to_string())
    }
}

fn step_names(result: &fleet_workflows::WorkflowResult) -> Vec<&str> {
    result.steps.iter().map(|s| s.name.as_str()).collect()
}

#[tokio::test]
async fn test_maintenance_happy_path() {
    let (orchestrator, store) = offline_orchestrator(42);

    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-001"))
        .await;

    assert_result_invariants(&result);
    assert!(result.success, "{}", result.summary());
    assert_eq!(result.steps.len(), 5);
    assert!(result
        .recommendations
        .iter()
        .any(|r| r.starts_with("Schedule maintenance for TRK-001")));
    assert_eq!(result.data["vehicle"]["vehicle_id"], "TRK-001");
    assert_eq!(result.data["synthesized"], Value::Bool(true));
    assert!(result.workflow_id.starts_with("predictive_maintenance_TRK-001_"));

    let vehicle = store.get_vehicle("TRK-001").await.unwrap().unwrap();
    assert_eq!(vehicle.embedding.map(|v| v.len()), Some(EMBEDDING_DIMENSION));
    assert_eq!(
        store
            .list_events(Some("predictive_maintenance"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_maintenance_high_brake_wear() {
    let (services, store) = Services::in_memory(Some(1));
    let services = services.with_data_source(Arc::new(FixedDataSource::with_brake_wear(95.0)));
    let orchestrator = orchestrator_with(services);

    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-002"))
        .await;

    assert!(result.success);
    assert!(result.recommendations[0].starts_with("CRITICAL: Brake wear at 95.0%"));
    assert_eq!(result.data["severity"], "high");
    assert_eq!(result.data["urgency"], "immediate");
    assert_eq!(result.data["maintenanceEvent"]["severity"], "high");
    assert_eq!(result.confidence, 5.0);
    assert!(result
        .recommendations
        .contains(&"Schedule maintenance for TRK-002 within 1 day".to_string()));

    let events = store.list_events(Some("predictive_maintenance")).await.unwrap();
    assert_eq!(events[0].severity, Severity::High);
    assert_eq!(events[0].vehicle_id.as_deref(), Some("TRK-002"));
    assert_eq!(events[0].metadata["riskLevel"], "critical");
}

#[tokio::test]
async fn test_maintenance_uses_stored_vehicle() {
    let (services, store) = Services::in_memory(Some(5));
    store
        .upsert_vehicle(
            VehicleUpsert::new("VAN-7")
                .vehicle_type("van")
                .metrics(metrics_with_brake_wear(10.0)),
        )
        .await
        .unwrap();
    let orchestrator = orchestrator_with(services);

    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("VAN-7"))
        .await;

    assert!(result.success);
    assert_eq!(result.data["synthesized"], Value::Bool(false));
    assert_eq!(result.data["vehicle"]["vehicle_type"], "van");
    assert_eq!(result.confidence, 90.0);
    assert_eq!(store.vehicle_count().await, 1);
}

#[tokio::test]
async fn test_similar_vehicles_exclude_self_and_rank_identical_first() {
    let (services, _store) = Services::in_memory(Some(2));
    let services = services.with_data_source(Arc::new(FixedDataSource::with_brake_wear(40.0)));
    let orchestrator = orchestrator_with(services);

    let first = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-100"))
        .await;
    assert_eq!(first.steps[1].payload.as_ref().unwrap()["count"], 0);

    let second = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-200"))
        .await;
    let similar = second.data["similarVehicles"].as_array().unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0]["vehicle_id"], "TRK-100");
    assert_eq!(similar[0]["similarity"], 100.0);
}

#[tokio::test]
async fn test_route_happy_path() {
    let (orchestrator, store) = offline_orchestrator(7);

    let result = orchestrator
        .run(
            WorkflowKind::RouteOptimization,
            WorkflowParams::route("New York Distribution Center", "Boston Medical Hub"),
        )
        .await;

    assert_result_invariants(&result);
    assert!(result.success, "{}", result.summary());
    assert_eq!(result.steps.len(), 5);
    assert!(result.recommendations.iter().any(|r| r.contains('%')));
    assert!(result.recommendations.iter().any(|r| r.contains('$')));
    assert!(result.workflow_id.starts_with("route_optimization_NYDC-BMH_"));

    let score = result.data["optimizationScore"].as_f64().unwrap();
    assert!((85.0..=100.0).contains(&score));
    assert_eq!(result.confidence, score);

    let route_id = result.data["route"]["route_id"].as_str().unwrap();
    let record = store.get_route(route_id).await.unwrap();
    assert_eq!(record.optimization_score, Some(score));
    assert!(record.ai_analysis.is_some());
    assert_eq!(record.embedding.map(|v| v.len()), Some(EMBEDDING_DIMENSION));
    assert_eq!(
        store
            .list_events(Some("route_optimization"))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_route_supplied_values_are_kept() {
    let (orchestrator, _store) = offline_orchestrator(8);
    let params = WorkflowParams::RouteOptimization {
        origin: "Depot A".to_string(),
        destination: "Depot B".to_string(),
        waypoints: Some(vec![]),
        distance_km: Some(120.0),
        estimated_minutes: Some(95),
        fuel_cost: Some(64.25),
        optimization_score: Some(78.0),
    };

    let result = orchestrator.run(WorkflowKind::RouteOptimization, params).await;

    assert!(result.success);
    assert_eq!(result.data["route"]["synthesized"], Value::Bool(false));
    assert_eq!(result.recommendations[1], "Estimated time: 95 minutes over 120.0 km");
    assert_eq!(result.recommendations[2], "Fuel cost: $64.25");
    assert!(result.recommendations[3].starts_with("Route needs optimization"));
    assert_eq!(result.confidence, 78.0);
}

#[tokio::test]
async fn test_route_rejects_non_finite_figures() {
    let (orchestrator, _store) = offline_orchestrator(9);
    let params = WorkflowParams::RouteOptimization {
        origin: "Depot A".to_string(),
        destination: "Depot B".to_string(),
        waypoints: None,
        distance_km: None,
        estimated_minutes: None,
        fuel_cost: None,
        optimization_score: Some(f64::NAN),
    };

    let result = orchestrator.run(WorkflowKind::RouteOptimization, params).await;

    assert_result_invariants(&result);
    assert!(!result.success);
    assert_eq!(result.steps.len(), 1);
    let failed = result.failed_step().unwrap();
    assert_eq!(failed.name, "Collect route data");
    assert!(failed.error.as_deref().unwrap().contains("optimization_score"));
}

#[tokio::test]
async fn test_emergency_happy_path() {
    let (services, _store) = Services::in_memory(Some(9));
    services.seed_fleet(5).await.unwrap();
    let orchestrator = orchestrator_with(services);
    let location = "Downtown Medical Center, Emergency Bay 3";

    let result = orchestrator
        .run(
            WorkflowKind::EmergencyResponse,
            WorkflowParams::emergency("Medical Emergency - Critical Supplies Needed", location),
        )
        .await;

    assert_result_invariants(&result);
    assert!(result.success, "{}", result.summary());
    assert_eq!(result.steps.len(), 4);
    let dispatched = result.data["dispatchedVehicles"].as_array().unwrap();
    assert!(dispatched.len() <= 3);
    assert_eq!(dispatched.len(), 3);
    assert!(result.recommendations.iter().any(|r| r.contains(location)));
    assert_eq!(result.recommendations[3], "Estimated arrival: 8-12 minutes");
    assert_eq!(result.confidence, 96.0);
    assert_eq!(result.data["emergencyEvent"]["severity"], "critical");
}

#[tokio::test]
async fn test_emergency_skips_unavailable_vehicles() {
    let (services, store) = Services::in_memory(Some(10));
    store
        .upsert_vehicle(VehicleUpsert::new("TRK-1").status(VehicleStatus::Offline))
        .await
        .unwrap();
    store
        .upsert_vehicle(VehicleUpsert::new("TRK-2").status(VehicleStatus::Idle))
        .await
        .unwrap();
    let orchestrator = orchestrator_with(services);

    let result = orchestrator
        .run(
            WorkflowKind::EmergencyResponse,
            WorkflowParams::emergency("Fire", "Dock 2"),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.data["dispatchedVehicles"], serde_json::json!(["TRK-2"]));
    assert_eq!(result.recommendations[2], "Dispatched 1 vehicle to the scene");
}

#[tokio::test]
async fn test_repeat_emergency_finds_previous_case() {
    let (orchestrator, _store) = offline_orchestrator(11);
    let params = || WorkflowParams::emergency("Chemical spill", "Warehouse 9");

    let first = orchestrator
        .run(WorkflowKind::EmergencyResponse, params())
        .await;
    assert_eq!(first.data["similarEmergencies"].as_array().unwrap().len(), 0);

    let second = orchestrator
        .run(WorkflowKind::EmergencyResponse, params())
        .await;
    let similar = second.data["similarEmergencies"].as_array().unwrap();
    assert_eq!(similar.len(), 1);
    assert_eq!(similar[0]["event_id"], first.data["emergencyEvent"]["id"]);
    assert_ne!(first.workflow_id, second.workflow_id);
}

#[tokio::test]
async fn test_completion_failure_aborts_at_step_three() {
    for (kind, params) in [
        (WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-404")),
        (WorkflowKind::RouteOptimization, WorkflowParams::route("A", "B")),
        (WorkflowKind::EmergencyResponse, WorkflowParams::emergency("Flood", "Yard 1")),
    ] {
        let (services, store) = Services::in_memory(Some(3));
        let services = services.with_completer(Arc::new(FailingCompleter));
        let orchestrator = orchestrator_with(services);

        let result = orchestrator.run(kind, params).await;

        assert_result_invariants(&result);
        assert!(!result.success);
        assert_eq!(result.steps.len(), 3);
        assert_eq!(result.steps[2].status, StepStatus::Failed);
        assert!(result.steps[2].error.as_deref().unwrap().contains("503"));
        assert!(result.recommendations.is_empty());
        assert_eq!(result.confidence, 0.0);

        for key in [
            "aiAnalysis",
            "aiOptimization",
            "aiStrategy",
            "maintenanceEvent",
            "routeRecord",
            "dispatchedVehicles",
            "recommendations",
        ] {
            assert!(!result.data.contains_key(key), "{} leaked into {}", key, kind);
        }
        if kind == WorkflowKind::Maintenance {
            assert!(store
                .list_events(Some("predictive_maintenance"))
                .await
                .unwrap()
                .is_empty());
        }
    }
}

#[tokio::test]
async fn test_fallback_policy_masks_provider_failure() {
    let (services, _store) = Services::in_memory(Some(4));
    let primary: Arc<dyn CompletionProvider> = Arc::new(FailingCompleter);
    let guarded = GuardedCompleter::new(Some(primary.clone()), ProviderErrorPolicy::Fallback);
    let orchestrator = orchestrator_with(services.clone().with_completer(Arc::new(guarded)));

    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-301"))
        .await;
    assert!(result.success);
    assert!(!result.data["aiAnalysis"].as_str().unwrap().is_empty());

    let strict = GuardedCompleter::new(Some(primary), ProviderErrorPolicy::Fail);
    let orchestrator = orchestrator_with(services.with_completer(Arc::new(strict)));
    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-302"))
        .await;
    assert!(!result.success);
    assert_eq!(result.steps.len(), 3);
}

#[tokio::test]
async fn test_missing_credentials_still_complete() {
    let mut config = AppConfig::default();
    config.engine.on_provider_error = ProviderErrorPolicy::Fail;
    config.engine.seed = Some(12);
    let config = config.with_env_from(|_| None);
    assert!(!config.provider.has_credentials());

    let (services, _store) = Services::from_config(&config);
    let vector = services.embedder.embed("engine temperature 99C").await.unwrap();
    assert_eq!(vector.len(), EMBEDDING_DIMENSION);
    assert!(!services.completer.complete("status?", None).await.unwrap().is_empty());

    let orchestrator = Orchestrator::new(services, config.engine.clone());
    for kind in WorkflowKind::ALL {
        let params = match kind {
            WorkflowKind::Maintenance => WorkflowParams::maintenance("TRK-900"),
            WorkflowKind::RouteOptimization => WorkflowParams::route("Depot A", "Depot B"),
            WorkflowKind::EmergencyResponse => WorkflowParams::emergency("Fire", "Dock 4"),
        };
        let result = orchestrator.run(kind, params).await;
        assert_result_invariants(&result);
        assert!(result.success, "{}", result.summary());
    }
}

#[tokio::test]
async fn test_every_embedding_has_full_dimension() {
    let (services, store) = Services::in_memory(Some(13));
    let embedder = Arc::new(CountingEmbedder::default());
    let long_location = "Loading bay ".repeat(2_000);
    let orchestrator = orchestrator_with(services.with_embedder(embedder.clone()));

    let result = orchestrator
        .run(
            WorkflowKind::EmergencyResponse,
            WorkflowParams::emergency("Gas leak", long_location),
        )
        .await;

    assert!(result.success);
    assert!(embedder.calls() >= 1);
    assert!(embedder.longest_input() <= MAX_EMBEDDING_INPUT_CHARS);
    for event in store.list_events(None).await.unwrap() {
        assert_eq!(event.embedding.map(|v| v.len()), Some(EMBEDDING_DIMENSION));
    }
}

#[tokio::test]
async fn test_registry_lookup_is_idempotent() {
    let (orchestrator, _store) = offline_orchestrator(14);
    let result = orchestrator
        .run(WorkflowKind::RouteOptimization, WorkflowParams::route("A", "B"))
        .await;

    let first = orchestrator.get(&result.workflow_id).await.unwrap();
    let second = orchestrator.get(&result.workflow_id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first, result);
    assert!(orchestrator.get("route_optimization_missing_0").await.is_none());
}

#[tokio::test]
async fn test_cancellation_between_steps() {
    let (services, _store) = Services::in_memory(Some(15));
    let token = CancellationToken::new();
    let services = services.with_completer(Arc::new(CancellingCompleter(token.clone())));
    let orchestrator = orchestrator_with(services);

    let result = orchestrator
        .run_with_cancel(
            WorkflowKind::Maintenance,
            WorkflowParams::maintenance("TRK-500"),
            token,
        )
        .await;

    assert_result_invariants(&result);
    assert_eq!(result.steps.len(), 4);
    assert_eq!(result.steps[2].status, StepStatus::Completed);
    assert_eq!(result.steps[3].name, "Record maintenance event");
    assert!(result.steps[3].error.as_deref().unwrap().contains("cancelled"));
    assert!(result.data.contains_key("aiAnalysis"));
    assert!(!result.data.contains_key("maintenanceEvent"));
}

#[tokio::test]
async fn test_deadline_between_steps() {
    let (services, _store) = Services::in_memory(Some(16));
    let services = services.with_completer(Arc::new(SlowCompleter(Duration::from_millis(60))));
    let config = EngineConfig {
        deadline_ms: Some(20),
        ..Default::default()
    };
    let orchestrator = Orchestrator::new(services, config);

    let result = orchestrator
        .run(
            WorkflowKind::EmergencyResponse,
            WorkflowParams::emergency("Fire", "Dock 1"),
        )
        .await;

    assert_result_invariants(&result);
    assert_eq!(result.steps.len(), 4);
    assert_eq!(result.steps[3].name, "Dispatch vehicles");
    assert!(result.steps[3].error.as_deref().unwrap().contains("20ms"));
}

#[tokio::test]
async fn test_mismatched_params_record_one_failed_step() {
    let (orchestrator, _store) = offline_orchestrator(17);
    let result = orchestrator
        .run(WorkflowKind::RouteOptimization, WorkflowParams::maintenance("TRK-1"))
        .await;

    assert_result_invariants(&result);
    assert_eq!(step_names(&result), vec!["Validate parameters"]);
    assert!(orchestrator.get(&result.workflow_id).await.is_some());
}

#[tokio::test]
async fn test_progress_events_mirror_steps() {
    let (services, _store) = Services::in_memory(Some(18));
    let orchestrator = orchestrator_with(services.with_completer(Arc::new(FailingCompleter)));
    let rx = orchestrator.subscribe();

    let result = orchestrator
        .run(WorkflowKind::Maintenance, WorkflowParams::maintenance("TRK-600"))
        .await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(events.iter().all(|e| e.workflow_id() == result.workflow_id));
    assert!(matches!(
        &events[0],
        ProgressEvent::StepStarted { index: 1, name, .. } if name == "Gather vehicle telemetry"
    ));
    assert!(matches!(
        &events[events.len() - 2],
        ProgressEvent::StepFailed { index: 3, .. }
    ));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::RunFinished { success: false, .. })
    ));
}

#[tokio::test]
async fn test_virtual_clock_orders_step_timestamps() {
    let start: DateTime<Utc> = "2024-03-01T08:00:00Z".parse().unwrap();
    let (services, _store) = Services::in_memory(Some(19));
    let orchestrator = orchestrator_with(services.with_clock(Clock::fixed(start)));

    let result = orchestrator
        .run(WorkflowKind::RouteOptimization, WorkflowParams::route("A", "B"))
        .await;

    assert_eq!(result.started_at, start);
    assert!(result
        .workflow_id
        .contains(&format!("_{}_", start.timestamp_millis())));
    assert_eq!(result.steps[0].timestamp, start);
    assert!(result
        .steps
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let (services, _store) = Services::in_memory(Some(20));
    services.seed_fleet(4).await.unwrap();
    let orchestrator = orchestrator_with(services);

    let params: Vec<WorkflowParams> = (0..6)
        .map(|i| match i % 3 {
            0 => WorkflowParams::maintenance(format!("TRK-C{}", i)),
            1 => WorkflowParams::route(format!("Depot {}", i), "Hub"),
            _ => WorkflowParams::emergency(format!("Incident {}", i), format!("Gate {}", i)),
        })
        .collect();
    let results = futures::future::join_all(
        params
            .into_iter()
            .map(|p| orchestrator.run(p.kind(), p)),
    )
    .await;

    for result in &results {
        assert_result_invariants(result);
        assert!(result.success, "{}", result.summary());
    }
    assert_eq!(orchestrator.list_all().await.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_same_millisecond_emergencies_are_all_registered() {
    let start: DateTime<Utc> = "2024-03-01T08:00:00Z".parse().unwrap();
    let (services, _store) = Services::in_memory(Some(23));
    let orchestrator = Arc::new(orchestrator_with(services.with_clock(Clock::fixed(start))));

    let rounds = 10;
    for _ in 0..rounds {
        let handles: Vec<_> = [("Fire", "Dock 2"), ("Flood", "Yard 7")]
            .into_iter()
            .map(|(emergency, location)| {
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    orchestrator
                        .run(
                            WorkflowKind::EmergencyResponse,
                            WorkflowParams::emergency(emergency, location),
                        )
                        .await
                })
            })
            .collect();

        for handle in handles {
            let result = handle.await.unwrap();
            assert!(result.success, "{}", result.summary());
            let stored = orchestrator.get(&result.workflow_id).await.unwrap();
            assert_eq!(stored.data["emergencyEvent"], result.data["emergencyEvent"]);
        }
    }

    assert_eq!(orchestrator.list_all().await.len(), rounds * 2);
}
