//! Common test utilities for integration tests
//!
//! Provides shared fixtures, fakes, and helpers used across multiple
//! integration test files.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::watch;

use canaryd::domain::errors::NotificationError;
use canaryd::domain::models::{
    Analysis, ApiFamily, CleanupPolicy, ControllerConfig, Experiment, ExperimentId,
    ExperimentMeta, ExperimentSpec, ExperimentStatus, MetricDefinition, Strategy,
    SuccessCriterion, TargetRef, ToleranceType, TrafficControl,
};
use canaryd::domain::ports::{LifecycleEvent, MetricStore, NotificationSink, StaticMetricStore};
use canaryd::infrastructure::memory::{MemoryCluster, MemoryRouting, ScriptedAnalytics};
use canaryd::services::state_machine::{ReconcileOutcome, ShutdownSignal};
use canaryd::services::{ExperimentStateMachine, IndexCache};

/// Setup test logging.
///
/// Initializes tracing subscriber for test output. Call at the beginning of
/// tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Notification sink that records every published event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl CollectingSink {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for CollectingSink {
    async fn publish(&self, event: LifecycleEvent) -> Result<(), NotificationError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Everything a state-machine test needs, wired against the in-memory
/// adapters.
pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub routing: Arc<MemoryRouting>,
    pub analytics: Arc<ScriptedAnalytics>,
    pub notifier: Arc<CollectingSink>,
    pub cache: Arc<IndexCache>,
    pub machine: Arc<ExperimentStateMachine>,
    shutdown_rx: ShutdownSignal,
    shutdown_tx: watch::Sender<bool>,
}

impl Harness {
    pub fn new(analytics: ScriptedAnalytics) -> Self {
        Self::with_metric_store(analytics, default_metric_store())
    }

    pub fn with_metric_store(analytics: ScriptedAnalytics, store: StaticMetricStore) -> Self {
        let cluster = Arc::new(MemoryCluster::new());
        let routing = Arc::new(MemoryRouting::new());
        let analytics = Arc::new(analytics);
        let notifier = Arc::new(CollectingSink::default());
        let cache = Arc::new(IndexCache::new());
        let machine = Arc::new(ExperimentStateMachine::new(
            cluster.clone(),
            routing.clone(),
            analytics.clone(),
            notifier.clone(),
            Arc::new(store) as Arc<dyn MetricStore>,
            cache.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            cluster,
            routing,
            analytics,
            notifier,
            cache,
            machine,
            shutdown_rx,
            shutdown_tx,
        }
    }

    /// Seed the cluster with the experiment and all three targets present.
    pub fn seed(&self, experiment: &Experiment) {
        self.cluster.add_service(experiment.service_key());
        self.cluster.add_workload(experiment.baseline_key());
        self.cluster.add_workload(experiment.candidate_key());
        self.cluster.put_experiment(experiment.clone());
    }

    /// Fetch-register-reconcile one pass, the way the dispatcher does.
    pub async fn reconcile(
        &self,
        id: &ExperimentId,
    ) -> Result<ReconcileOutcome, canaryd::domain::errors::ReconcileError> {
        let experiment = self
            .cluster
            .experiment(id)
            .expect("experiment must exist for reconcile");
        self.cache.register_experiment(&experiment);
        self.machine.reconcile(experiment, &self.shutdown_rx).await
    }

    /// Reconcile until the stored record reaches the Completed phase, capped
    /// at `max_passes`. Rewinds the iteration clock between passes so
    /// interval gating never stalls the test.
    pub async fn reconcile_to_completion(&self, id: &ExperimentId, max_passes: usize) {
        for _ in 0..max_passes {
            let _ = self.reconcile(id).await;
            let Some(stored) = self.cluster.experiment(id) else {
                return;
            };
            if stored.status.phase.is_terminal() {
                return;
            }
            self.rewind_clock(id);
        }
        panic!("experiment did not complete within {max_passes} passes");
    }

    /// Backdate the last increment so the next iteration is due immediately.
    pub fn rewind_clock(&self, id: &ExperimentId) {
        let Some(mut experiment) = self.cluster.experiment(id) else {
            return;
        };
        if let Some(last) = experiment.status.last_increment_time {
            experiment.status.last_increment_time =
                Some(last - Duration::seconds(i64::from(u32::MAX)));
            self.cluster.put_experiment(experiment);
        }
    }

    /// Signal shutdown to subsequent reconciles.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Wait for a condition to be true with timeout.
///
/// Polls the predicate every 50ms until it returns true or the timeout is
/// reached.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < std::time::Duration::from_millis(timeout_ms) {
        if predicate() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    predicate()
}

/// Metric store defining the fixture's `error_rate` metric.
pub fn default_metric_store() -> StaticMetricStore {
    StaticMetricStore::default().with_definition(
        "error_rate",
        MetricDefinition {
            query_template: "sum(rate(errors_total{job='$name'}[$interval]))".to_string(),
            sample_size_template: "sum(increase(requests_total{job='$name'}[$interval]))"
                .to_string(),
        },
    )
}

/// Fixture experiment: 3 iterations, 25-point steps, 10s interval.
pub fn experiment(name: &str, namespace: &str) -> Experiment {
    Experiment {
        metadata: ExperimentMeta {
            name: name.to_string(),
            namespace: namespace.to_string(),
            generation: 1,
            resource_version: 1,
            finalizers: vec![],
            deletion_timestamp: None,
        },
        spec: ExperimentSpec {
            target_ref: TargetRef {
                api_family: ApiFamily::Kubernetes,
                service_name: format!("{name}-svc"),
            },
            baseline_name: format!("{name}-v1"),
            candidate_name: format!("{name}-v2"),
            traffic_control: TrafficControl {
                max_iterations: 3,
                interval_seconds: 10,
                traffic_step_size: 25.0,
                strategy: Strategy::CheckAndIncrement,
            },
            analysis: Analysis {
                analytics_endpoint: "http://analytics:8080".to_string(),
                success_criteria: vec![SuccessCriterion {
                    metric: "error_rate".to_string(),
                    tolerance: 0.02,
                    tolerance_type: ToleranceType::Threshold,
                    sample_size: 100,
                    stop_on_failure: true,
                }],
            },
            cleanup_policy: CleanupPolicy::None,
            action: None,
        },
        metrics: BTreeMap::new(),
        status: ExperimentStatus::default(),
    }
}

/// Controller configuration tuned for fast tests.
pub fn test_config() -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.workers = 2;
    config.backoff.initial_backoff_ms = 10;
    config.backoff.max_backoff_ms = 100;
    config
}
