//! Canaryd CLI entry point.
//!
//! The production manager (cluster watch plumbing, dataplane adapters) wires
//! this crate as a library. The binary carries the operational tooling:
//! `check-config` prints the effective configuration, `simulate` drives one
//! experiment end-to-end through the real dispatcher and state machine
//! against the in-memory adapters.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use canaryd::domain::models::{
    Analysis, ApiFamily, CleanupPolicy, ControllerConfig, Experiment, ExperimentMeta,
    ExperimentSpec, MetricDefinition, Strategy, SuccessCriterion, TargetRef, ToleranceType,
    TrafficControl,
};
use canaryd::domain::ports::{NullNotificationSink, StaticMetricStore};
use canaryd::infrastructure::memory::{MemoryCluster, MemoryRouting, ScriptedAnalytics};
use canaryd::infrastructure::{logging, ConfigLoader};
use canaryd::services::{ExperimentStateMachine, IndexCache, ReconcileDispatcher};
use clap::{Parser, Subcommand};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "canaryd",
    about = "Progressive-delivery experiment controller tooling"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate, and print the effective configuration.
    CheckConfig {
        /// Explicit configuration file instead of the default search path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Drive one experiment end-to-end against in-memory adapters.
    Simulate {
        /// Analytics iterations before natural completion.
        #[arg(long, default_value_t = 3)]
        iterations: u32,
        /// Maximum candidate traffic shift per iteration, in percent.
        #[arg(long, default_value_t = 25.0)]
        step_size: f64,
        /// Seconds between iterations.
        #[arg(long, default_value_t = 1)]
        interval_seconds: u64,
        /// Delete the losing workload at completion.
        #[arg(long)]
        cleanup: bool,
        /// Explicit configuration file instead of the default search path.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckConfig { config } => {
            let config = load_config(config)?;
            let rendered =
                serde_yaml::to_string(&config).context("Failed to render configuration")?;
            print!("{rendered}");
            Ok(())
        }
        Commands::Simulate {
            iterations,
            step_size,
            interval_seconds,
            cleanup,
            config,
        } => {
            let config = load_config(config)?;
            let _logging_guard = logging::init(&config.logging)?;
            simulate(&config, iterations, step_size, interval_seconds, cleanup).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<ControllerConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .context("Failed to load configuration")
}

/// Run one scripted experiment through the real reconcile core.
async fn simulate(
    config: &ControllerConfig,
    iterations: u32,
    step_size: f64,
    interval_seconds: u64,
    cleanup: bool,
) -> Result<()> {
    let cluster = Arc::new(MemoryCluster::new());
    let routing = Arc::new(MemoryRouting::new());
    let cache = Arc::new(IndexCache::new());
    let metric_store = Arc::new(StaticMetricStore::default().with_definition(
        "error_rate",
        MetricDefinition {
            query_template: "sum(rate(errors_total{job='$name'}[$interval]))".to_string(),
            sample_size_template: "sum(increase(requests_total{job='$name'}[$interval]))"
                .to_string(),
        },
    ));

    // Linear candidate ramp, declared successful on the final iteration.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let step = step_size.max(1.0).floor() as u32;
    let mut analytics = ScriptedAnalytics::new();
    let mut candidate = 0u32;
    for _ in 0..iterations {
        candidate = (candidate + step).min(100);
        analytics = analytics.then_split(100 - candidate, candidate, true, false);
    }
    let analytics = Arc::new(analytics);

    let machine = Arc::new(ExperimentStateMachine::new(
        cluster.clone(),
        routing.clone(),
        analytics.clone(),
        Arc::new(NullNotificationSink),
        metric_store,
        cache.clone(),
    ));
    let dispatcher = Arc::new(ReconcileDispatcher::new(
        machine,
        cluster.clone(),
        cache,
        config.workers,
        config.backoff.clone(),
    ));

    let experiment = simulation_experiment(iterations, step_size, interval_seconds, cleanup);
    let id = experiment.id();
    cluster.add_service(experiment.service_key());
    cluster.add_workload(experiment.baseline_key());
    cluster.add_workload(experiment.candidate_key());
    cluster.put_experiment(experiment);

    info!(experiment = %id, iterations, step_size, "starting simulation");
    dispatcher.enqueue(id.clone());
    let runner = tokio::spawn(Arc::clone(&dispatcher).run());

    let budget = Duration::from_secs(u64::from(iterations) * interval_seconds + 30);
    let deadline = tokio::time::Instant::now() + budget;
    let outcome = loop {
        let Some(current) = cluster.experiment(&id) else {
            bail!("experiment record vanished during simulation");
        };
        if current.status.phase.is_terminal() {
            break current;
        }
        if tokio::time::Instant::now() > deadline {
            bail!("simulation did not complete within {budget:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    };

    dispatcher.shutdown();
    runner.await.context("dispatcher worker pool panicked")?;

    info!(
        phase = outcome.status.phase.as_str(),
        iterations = outcome.status.current_iteration,
        final_split = %outcome.status.traffic_split,
        stable = outcome.stable_target().as_str(),
        analytics_calls = analytics.call_count(),
        dataplane_split = ?routing.installed(&id),
        "simulation complete"
    );
    Ok(())
}

fn simulation_experiment(
    iterations: u32,
    step_size: f64,
    interval_seconds: u64,
    cleanup: bool,
) -> Experiment {
    Experiment {
        metadata: ExperimentMeta {
            name: "simulated-rollout".to_string(),
            namespace: "simulation".to_string(),
            generation: 1,
            resource_version: 1,
            finalizers: vec![],
            deletion_timestamp: None,
        },
        spec: ExperimentSpec {
            target_ref: TargetRef {
                api_family: ApiFamily::Kubernetes,
                service_name: "demo".to_string(),
            },
            baseline_name: "demo-v1".to_string(),
            candidate_name: "demo-v2".to_string(),
            traffic_control: TrafficControl {
                max_iterations: iterations,
                interval_seconds,
                traffic_step_size: step_size,
                strategy: Strategy::CheckAndIncrement,
            },
            analysis: Analysis {
                analytics_endpoint: "http://analytics.simulation:8080".to_string(),
                success_criteria: vec![SuccessCriterion {
                    metric: "error_rate".to_string(),
                    tolerance: 0.02,
                    tolerance_type: ToleranceType::Threshold,
                    sample_size: 100,
                    stop_on_failure: true,
                }],
            },
            cleanup_policy: if cleanup {
                CleanupPolicy::Delete
            } else {
                CleanupPolicy::None
            },
            action: None,
        },
        metrics: std::collections::BTreeMap::new(),
        status: canaryd::domain::models::ExperimentStatus::default(),
    }
}
