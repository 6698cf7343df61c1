use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fleet_workflows::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[cfg(feature = "otel")]
use tracing_subscriber::layer::SubscriberExt;
#[cfg(feature = "otel")]
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Config file picked up from the working directory when `--config` is absent
const DEFAULT_CONFIG_FILE: &str = "fleet.yaml";

#[derive(Parser)]
#[command(name = "fleet-workflows")]
#[command(about = "Run logistics AI workflows", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file (default: ./fleet.yaml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seed for synthetic telemetry (overrides config)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single workflow
    Run {
        #[command(subcommand)]
        workflow: RunCommand,
    },

    /// Seed a demo fleet and run all three workflows concurrently
    Demo {
        /// Number of vehicles to seed before running
        #[arg(long, default_value_t = 8)]
        vehicles: usize,
    },

    /// Seed a demo fleet and watch it for threshold alerts until Ctrl-C
    Monitor {
        /// Number of vehicles to seed
        #[arg(long, default_value_t = 8)]
        vehicles: usize,

        /// Scan interval in milliseconds (overrides config)
        #[arg(short, long)]
        interval_ms: Option<u64>,
    },
}

#[derive(Subcommand)]
enum RunCommand {
    /// Predictive maintenance for one vehicle
    Maintenance {
        #[arg(long)]
        vehicle_id: String,

        #[arg(long)]
        vehicle_type: Option<String>,
    },

    /// Optimize a route between two locations
    Route {
        #[arg(long)]
        origin: String,

        #[arg(long)]
        destination: String,

        /// Intermediate stop (repeatable)
        #[arg(long = "waypoint")]
        waypoints: Vec<String>,

        #[arg(long)]
        distance_km: Option<f64>,

        #[arg(long)]
        estimated_minutes: Option<u32>,

        #[arg(long)]
        fuel_cost: Option<f64>,
    },

    /// Coordinate the response to an emergency
    Emergency {
        #[arg(long)]
        emergency_type: String,

        #[arg(long)]
        location: String,
    },
}

impl RunCommand {
    fn into_params(self) -> WorkflowParams {
        match self {
            RunCommand::Maintenance {
                vehicle_id,
                vehicle_type,
            } => WorkflowParams::Maintenance {
                vehicle_id,
                vehicle_type,
            },
            RunCommand::Route {
                origin,
                destination,
                waypoints,
                distance_km,
                estimated_minutes,
                fuel_cost,
            } => WorkflowParams::RouteOptimization {
                origin,
                destination,
                waypoints: (!waypoints.is_empty()).then_some(waypoints),
                distance_km,
                estimated_minutes,
                fuel_cost,
                optimization_score: None,
            },
            RunCommand::Emergency {
                emergency_type,
                location,
            } => WorkflowParams::EmergencyResponse {
                emergency_type,
                location,
            },
        }
    }
}

#[cfg(feature = "otel")]
fn init_otel_tracing(verbose: bool) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;
    use opentelemetry_sdk::runtime::Tokio;
    use opentelemetry_sdk::trace::TracerProvider;

    let filter = if verbose {
        "fleet_workflows=debug"
    } else {
        "fleet_workflows=info"
    };

    let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4317".to_string());

    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp_endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("OTLP exporter unavailable ({}), tracing to stderr only", e);
            init_tracing(verbose);
            return;
        }
    };

    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter, Tokio)
        .build();

    let tracer = provider.tracer("fleet-workflows");
    let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(otel_layer)
        .init();

    opentelemetry::global::set_tracer_provider(provider);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "fleet_workflows=debug"
    } else {
        "fleet_workflows=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    #[cfg(feature = "otel")]
    init_otel_tracing(cli.verbose);

    #[cfg(not(feature = "otel"))]
    init_tracing(cli.verbose);

    let result = run(cli).await;

    #[cfg(feature = "otel")]
    opentelemetry::global::shutdown_tracer_provider();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            tracing::error!(error = %e, "fleet-workflows failed");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = load_config(cli.config.as_deref())?;
    if cli.seed.is_some() {
        config.engine.seed = cli.seed;
    }

    match cli.command {
        Commands::Run { workflow } => run_single(&config, workflow.into_params()).await,
        Commands::Demo { vehicles } => run_demo(&config, vehicles).await,
        Commands::Monitor {
            vehicles,
            interval_ms,
        } => run_monitor(config, vehicles, interval_ms).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => AppConfig::load(DEFAULT_CONFIG_FILE)?,
        None => AppConfig::default(),
    };
    Ok(config.with_env())
}

async fn run_single(config: &AppConfig, params: WorkflowParams) -> anyhow::Result<bool> {
    let (services, store) = Services::from_config(config);
    let background = BackgroundMonitor::start(config, store);
    let orchestrator = Orchestrator::new(services, config.engine.clone());
    let progress = orchestrator.subscribe();
    let printer = spawn_progress_printer(progress.clone());

    let result = orchestrator.run(params.kind(), params).await;
    // closing lets the printer drain what is queued, then stop
    progress.close();
    printer.await?;

    print_workflow_result(&result);
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(background) = background {
        background.stop().await?;
    }
    Ok(result.success)
}

async fn run_demo(config: &AppConfig, vehicles: usize) -> anyhow::Result<bool> {
    let (services, store) = Services::from_config(config);
    services.seed_fleet(vehicles).await?;
    let background = BackgroundMonitor::start(config, store);
    let orchestrator = Orchestrator::new(services, config.engine.clone());

    let runs = [
        WorkflowParams::maintenance("TRK-001"),
        WorkflowParams::route("New York Distribution Center", "Boston Medical Hub"),
        WorkflowParams::emergency(
            "Medical Emergency - Critical Supplies Needed",
            "Downtown Medical Center, Emergency Bay 3",
        ),
    ];
    let results = futures::future::join_all(
        runs.into_iter()
            .map(|params| orchestrator.run(params.kind(), params)),
    )
    .await;

    for result in &results {
        print_workflow_result(result);
    }
    let all = orchestrator.list_all().await;
    println!("{}", serde_json::to_string_pretty(&all)?);
    if let Some(background) = background {
        background.stop().await?;
    }
    Ok(results.iter().all(|r| r.success))
}

async fn run_monitor(
    mut config: AppConfig,
    vehicles: usize,
    interval_ms: Option<u64>,
) -> anyhow::Result<bool> {
    if let Some(interval_ms) = interval_ms {
        config.monitor.interval_ms = interval_ms;
    }
    let (services, store) = Services::from_config(&config);
    services.seed_fleet(vehicles).await?;

    let monitor = Arc::new(FleetMonitor::new(store, config.monitor.clone()));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn({
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        async move { monitor.run(cancel).await }
    });

    info!("Press Ctrl-C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
    }
    cancel.cancel();
    handle.await?;
    Ok(true)
}

/// Fleet monitor running beside workflow runs when `monitor.enabled` is set
struct BackgroundMonitor {
    monitor: Arc<FleetMonitor>,
    cancel: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl BackgroundMonitor {
    fn start(config: &AppConfig, store: Arc<MemoryStore>) -> Option<Self> {
        if !config.monitor.enabled {
            return None;
        }
        let monitor = Arc::new(FleetMonitor::new(store, config.monitor.clone()));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn({
            let monitor = monitor.clone();
            let cancel = cancel.clone();
            async move { monitor.run(cancel).await }
        });
        Some(Self {
            monitor,
            cancel,
            handle,
        })
    }

    /// Stop the loop, then scan once more so alerts caused by the runs are seen
    async fn stop(self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.handle.await?;
        let alerts = self.monitor.tick().await?;
        info!("Fleet monitor raised {} alert(s) after the runs", alerts.len());
        Ok(())
    }
}

/// Echo step progress to stderr while a run is in flight
fn spawn_progress_printer(
    rx: async_channel::Receiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                ProgressEvent::StepStarted { index, name, .. } => {
                    eprintln!("  [{}] {} ...", index, name);
                }
                ProgressEvent::StepCompleted { index, name, .. } => {
                    eprintln!("  [{}] ✓ {}", index, name);
                }
                ProgressEvent::StepFailed {
                    index, name, error, ..
                } => {
                    eprintln!("  [{}] ✗ {}: {}", index, name, error);
                }
                ProgressEvent::RunFinished { .. } => {}
            }
        }
    })
}

fn print_workflow_result(result: &WorkflowResult) {
    eprintln!("\n=== {} ===\n", result.kind);
    eprintln!("Success: {}", if result.success { "YES" } else { "NO" });
    eprintln!("Workflow ID: {}", result.workflow_id);
    eprintln!("Execution time: {}ms\n", result.execution_time);

    for step in &result.steps {
        let status = match step.status {
            StepStatus::Completed => "✓",
            StepStatus::Failed => "✗",
            _ => "…",
        };
        eprintln!("  {} Step {}: {}", status, step.index, step.name);
        if let Some(err) = &step.error {
            eprintln!("      Error: {}", err);
        }
    }

    if result.success {
        eprintln!("\nRecommendations ({:.0}% confidence):", result.confidence);
        for line in &result.recommendations {
            eprintln!("  - {}", line);
        }
    }
}
