//! Experiment reconciliation state machine.
//!
//! Level-triggered control loop: every reconcile observes the experiment and
//! the dataplane and converges them toward the declared spec. Every step is
//! safe to repeat, so the loop survives controller restarts, write conflicts,
//! and partially applied previous passes.
//!
//! ```text
//! Initializing ──targets present──▶ Progressing ──terminal condition──▶ Completed
//!      │                                   │
//!      └── action=terminate ───────────────┘ (→ Completed immediately)
//! ```

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::errors::{ClusterError, ReconcileError, RoutingError};
use crate::domain::models::{
    ApiFamily, CleanupPolicy, ConditionKind, ConditionStatus, Experiment, ExperimentAction,
    ExperimentId, ExperimentPhase, ExperimentStatus, StableTarget, TerminationReason,
    TrafficSplit,
};
use crate::domain::ports::{
    AnalyticsService, ClusterClient, LifecyclePayload, MetricStore, NotificationSink,
    RoutingAdapter,
};
use crate::infrastructure::analytics::types::AnalyticsRequest;
use crate::services::{IndexCache, TargetResolver};

/// Receiver side of the controller shutdown signal. A reconcile observing
/// `true` stops without further status writes.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Condition reasons the state machine records. The analytics-stop reason
/// doubles as the durable completion marker checked on restart.
mod reasons {
    pub const METRICS_LOADED: &str = "MetricsLoaded";
    pub const METRIC_SYNC_FAILED: &str = "MetricSyncFailed";
    pub const VALIDATION_FAILED: &str = "ValidationFailed";
    pub const ROUTING_INSTALLED: &str = "RoutingRulesInstalled";
    pub const ROUTING_REJECTED: &str = "RoutingRulesRejected";
    pub const TARGETS_FOUND: &str = "TargetsFound";
    pub const TARGETS_NOT_FOUND: &str = "TargetsNotFound";
    pub const ANALYTICS_RESPONSIVE: &str = "AnalyticsResponsive";
    pub const ANALYTICS_FAILURE: &str = "AnalyticsFailure";
    pub const ITERATION_ASSESSMENT: &str = "IterationAssessment";
    pub const ANALYTICS_STOP: &str = "AnalyticsStop";
    pub const OPERATOR_TERMINATED: &str = "OperatorTerminated";
    pub const MAX_ITERATIONS_REACHED: &str = "MaxIterationsReached";
    pub const FINAL_ROUTING_PENDING: &str = "FinalRoutingPending";
    pub const EXPERIMENT_DELETED: &str = "ExperimentDeleted";
}

/// What the dispatcher should do after a successful reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing scheduled; the next cluster event re-enqueues the experiment.
    Done,
    /// Re-enqueue after the given delay (typically the traffic-control
    /// interval).
    RequeueAfter(StdDuration),
}

/// The reconcile state machine, shared across workload API families.
pub struct ExperimentStateMachine {
    cluster: Arc<dyn ClusterClient>,
    routing: Arc<dyn RoutingAdapter>,
    analytics: Arc<dyn AnalyticsService>,
    notifier: Arc<dyn NotificationSink>,
    metric_store: Arc<dyn MetricStore>,
    cache: Arc<IndexCache>,
    resolver: TargetResolver,
}

impl ExperimentStateMachine {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        routing: Arc<dyn RoutingAdapter>,
        analytics: Arc<dyn AnalyticsService>,
        notifier: Arc<dyn NotificationSink>,
        metric_store: Arc<dyn MetricStore>,
        cache: Arc<IndexCache>,
    ) -> Self {
        let resolver = TargetResolver::new(cluster.clone(), cache.clone());
        Self {
            cluster,
            routing,
            analytics,
            notifier,
            metric_store,
            cache,
            resolver,
        }
    }

    /// Run one reconcile pass for the experiment.
    ///
    /// Transient failures surface as [`ReconcileError::Transient`] and are
    /// requeued with backoff by the dispatcher; everything user-visible is
    /// recorded as a condition on the record instead.
    pub async fn reconcile(
        &self,
        mut experiment: Experiment,
        cancel: &ShutdownSignal,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        ensure_active(cancel)?;

        // Deletion wins over everything, including the completed gate:
        // finalization must run for completed records too.
        if experiment.is_deleting() {
            return self.finalize(experiment).await;
        }

        if experiment.status.phase.is_terminal() {
            debug!("experiment already completed, nothing to do");
            return Ok(ReconcileOutcome::Done);
        }

        // Take ownership before any other side effect: the finalizer is the
        // commit point for "this controller owns cleanup".
        if !experiment.has_finalizer() {
            experiment.add_finalizer();
            match self.cluster.update_experiment(&experiment).await {
                Ok(updated) => {
                    experiment = updated;
                    self.publish(experiment.id(), LifecyclePayload::ExperimentCreated)
                        .await;
                }
                Err(err) if err.is_conflict() => {
                    debug!("finalizer write conflict, deferring to next event");
                    return Ok(ReconcileOutcome::Done);
                }
                Err(ClusterError::NotFound(_)) => return Ok(ReconcileOutcome::Done),
                Err(err) => return Err(err.into()),
            }
        }

        let mut persisted_status = experiment.status.clone();

        if !experiment.status.initialized() {
            experiment.status.initialize(Utc::now());
            info!("initialized experiment status");
        }

        if let Err(reason) = experiment.spec.validate() {
            return self
                .fail_validation(experiment, &mut persisted_status, reason)
                .await;
        }

        if self
            .sync_metrics(&mut experiment, &mut persisted_status)
            .await?
            .is_none()
        {
            return Ok(ReconcileOutcome::Done);
        }

        match experiment.spec.target_ref.api_family {
            ApiFamily::Kubernetes | ApiFamily::Knative => {
                self.sync_experiment(experiment, persisted_status, cancel)
                    .await
            }
            ApiFamily::Unsupported => {
                self.fail_validation(
                    experiment,
                    &mut persisted_status,
                    "unsupported workload API family".to_string(),
                )
                .await
            }
        }
    }

    /// Shared inner algorithm for both workload families: routing init,
    /// target detection, interval-gated progression, completion.
    async fn sync_experiment(
        &self,
        mut experiment: Experiment,
        mut persisted_status: ExperimentStatus,
        cancel: &ShutdownSignal,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let interval = experiment.spec.traffic_control.interval();

        // RoutingInit: make the dataplane agree with the recorded split
        // before anything else. This is also what heals a restart between a
        // status write and its routing write.
        match self.routing.current_split(&experiment.id()).await {
            Ok(None) => {
                let split = if experiment.status.traffic_split.is_installed() {
                    experiment.status.traffic_split
                } else {
                    TrafficSplit::baseline_all()
                };
                if let Err(err) = self.routing.install(&experiment, split).await {
                    return self
                        .routing_failure(experiment, &mut persisted_status, err)
                        .await;
                }
                info!(split = %split, "installed routing rules");
                experiment.status.traffic_split = split;
                experiment.status.set_condition(
                    ConditionKind::RoutingRulesReady,
                    ConditionStatus::True,
                    reasons::ROUTING_INSTALLED,
                    None,
                );
            }
            Ok(Some(current)) => {
                if experiment.status.traffic_split.is_installed()
                    && current != experiment.status.traffic_split
                {
                    info!(
                        dataplane = %current,
                        recorded = %experiment.status.traffic_split,
                        "dataplane split trails recorded split, re-applying"
                    );
                    if let Err(err) = self
                        .routing
                        .apply_split(&experiment, experiment.status.traffic_split)
                        .await
                    {
                        return self
                            .routing_failure(experiment, &mut persisted_status, err)
                            .await;
                    }
                }
                experiment.status.set_condition(
                    ConditionKind::RoutingRulesReady,
                    ConditionStatus::True,
                    reasons::ROUTING_INSTALLED,
                    None,
                );
            }
            Err(err) => {
                return self
                    .routing_failure(experiment, &mut persisted_status, err)
                    .await;
            }
        }

        // TargetDetect: no requeue on missing targets; the workload events
        // admitted by the filter wake us up.
        if !experiment.status.condition_true(ConditionKind::TargetsProvided) {
            let bundle = self.resolver.resolve(&experiment).await?;
            if bundle.all_present() {
                experiment.status.set_condition(
                    ConditionKind::TargetsProvided,
                    ConditionStatus::True,
                    reasons::TARGETS_FOUND,
                    None,
                );
            } else {
                let missing = bundle
                    .missing()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                debug!(missing = %missing, "targets not yet present");
                experiment.status.set_condition(
                    ConditionKind::TargetsProvided,
                    ConditionStatus::False,
                    reasons::TARGETS_NOT_FOUND,
                    Some(format!("missing: {missing}")),
                );
                self.persist_status(&mut experiment, &mut persisted_status)
                    .await?;
                return Ok(ReconcileOutcome::Done);
            }
        }

        if experiment.status.phase == ExperimentPhase::Initializing {
            experiment.status.phase = ExperimentPhase::Progressing;
            info!("experiment is progressing");
        }

        // Operator pause suppresses progression but routing stays converged.
        if experiment.spec.is_paused() {
            self.persist_status(&mut experiment, &mut persisted_status)
                .await?;
            return Ok(ReconcileOutcome::RequeueAfter(to_std(interval)));
        }

        // Completion check before progression: operator termination, an
        // exhausted iteration budget, or a durable analytics stop marker left
        // by an interrupted pass all complete without another analytics call.
        if let Some(reason) = self.completion_reason(&experiment) {
            return self
                .complete(experiment, &mut persisted_status, reason)
                .await;
        }

        let now = Utc::now();
        if !experiment.status.iteration_due(interval, now) {
            self.persist_status(&mut experiment, &mut persisted_status)
                .await?;
            let wait = experiment.status.time_until_due(interval, now);
            return Ok(ReconcileOutcome::RequeueAfter(to_std(wait)));
        }

        ensure_active(cancel)?;

        // One analytics iteration.
        let request = AnalyticsRequest::for_experiment(&experiment);
        let endpoint = experiment.spec.analysis.analytics_endpoint.clone();
        let response = match self.analytics.invoke(&endpoint, &request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "analytics check failed, deferring to next interval");
                experiment.status.set_condition(
                    ConditionKind::AnalyticsServiceNormal,
                    ConditionStatus::False,
                    reasons::ANALYTICS_FAILURE,
                    Some(err.to_string()),
                );
                self.persist_status(&mut experiment, &mut persisted_status)
                    .await?;
                return Ok(ReconcileOutcome::RequeueAfter(to_std(interval)));
            }
        };

        experiment.status.set_condition(
            ConditionKind::AnalyticsServiceNormal,
            ConditionStatus::True,
            reasons::ANALYTICS_RESPONSIVE,
            None,
        );

        let current = experiment.status.traffic_split;
        let next = TrafficSplit::clamp_step(
            current,
            response.new_traffic_split.into(),
            experiment.spec.traffic_control.traffic_step_size,
        );
        experiment.status.traffic_split = next;
        experiment.status.current_iteration += 1;
        experiment.status.last_increment_time = Some(now);
        experiment.status.assessment = Some(response.assessment.clone());
        experiment.status.last_state = Some(response.last_state.clone());

        let verdict = if response.success {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        };
        let reason = if response.stop {
            reasons::ANALYTICS_STOP
        } else {
            reasons::ITERATION_ASSESSMENT
        };
        let message = (!response.message.is_empty()).then(|| response.message.clone());
        experiment
            .status
            .set_condition(ConditionKind::ExperimentSucceeded, verdict, reason, message);

        info!(
            iteration = experiment.status.current_iteration,
            split = %next,
            success = response.success,
            stop = response.stop,
            "applied analytics response"
        );

        // Status commits before the dataplane write: an interruption here is
        // healed by the next pass's RoutingInit, never the other way around.
        if !self
            .persist_status(&mut experiment, &mut persisted_status)
            .await?
        {
            return Ok(ReconcileOutcome::Done);
        }
        if let Err(err) = self.routing.apply_split(&experiment, next).await {
            return self
                .routing_failure(experiment, &mut persisted_status, err)
                .await;
        }

        self.publish(
            experiment.id(),
            LifecyclePayload::IterationCompleted {
                iteration: experiment.status.current_iteration,
                summary: response.message,
            },
        )
        .await;

        if let Some(reason) = self.completion_reason(&experiment) {
            return self
                .complete(experiment, &mut persisted_status, reason)
                .await;
        }

        self.persist_status(&mut experiment, &mut persisted_status)
            .await?;
        Ok(ReconcileOutcome::RequeueAfter(to_std(interval)))
    }

    /// Why the experiment should complete now, if it should.
    fn completion_reason(&self, experiment: &Experiment) -> Option<&'static str> {
        if experiment.spec.wants_termination() {
            return Some(reasons::OPERATOR_TERMINATED);
        }
        if experiment.status.current_iteration
            >= experiment.spec.traffic_control.max_iterations
        {
            return Some(reasons::MAX_ITERATIONS_REACHED);
        }
        if experiment
            .status
            .condition_reason(ConditionKind::ExperimentSucceeded)
            == Some(reasons::ANALYTICS_STOP)
        {
            return Some(reasons::ANALYTICS_STOP);
        }
        None
    }

    /// Terminate the experiment: final routing first, then the terminal
    /// status write, then cleanup and notification.
    async fn complete(
        &self,
        mut experiment: Experiment,
        persisted_status: &mut ExperimentStatus,
        reason: &'static str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let stable = experiment.stable_target();
        let final_split = stable.final_split();

        // The final routing update must land (or at least be attempted)
        // before ExperimentCompleted flips true.
        if let Err(err) = self.routing.apply_split(&experiment, final_split).await {
            warn!(error = %err, "final routing update failed");
            experiment.status.set_condition(
                ConditionKind::ExperimentCompleted,
                ConditionStatus::Unknown,
                reasons::FINAL_ROUTING_PENDING,
                Some(err.to_string()),
            );
            let _ = self
                .persist_status(&mut experiment, persisted_status)
                .await;
            return match err {
                RoutingError::Retryable(_) => Err(err.into()),
                RoutingError::Fatal(_) => Ok(ReconcileOutcome::Done),
            };
        }
        experiment.status.traffic_split = final_split;

        // Operator-driven endings overwrite the analytics verdict.
        if let Some(termination) = experiment.spec.action.and_then(|a| a.termination_reason()) {
            let verdict = if termination.is_abort() {
                ConditionStatus::False
            } else {
                ConditionStatus::True
            };
            experiment.status.set_condition(
                ConditionKind::ExperimentSucceeded,
                verdict,
                reasons::OPERATOR_TERMINATED,
                Some(termination.as_str().to_string()),
            );
        }

        if experiment.spec.cleanup_policy == CleanupPolicy::Delete {
            self.cleanup(&experiment, stable).await?;
        }

        experiment.status.set_condition(
            ConditionKind::ExperimentCompleted,
            ConditionStatus::True,
            reason,
            None,
        );
        experiment.status.phase = ExperimentPhase::Completed;
        experiment.status.end_timestamp = Some(Utc::now());
        if !self
            .persist_status(&mut experiment, persisted_status)
            .await?
        {
            return Ok(ReconcileOutcome::Done);
        }

        let succeeded = experiment
            .status
            .condition_true(ConditionKind::ExperimentSucceeded);
        info!(
            stable = stable.as_str(),
            succeeded,
            reason,
            "experiment completed"
        );

        let aborted = experiment
            .spec
            .action
            .and_then(|a| a.termination_reason())
            .is_some_and(|r| r.is_abort());
        let payload = if aborted {
            LifecyclePayload::ExperimentAborted {
                reason: reason.to_string(),
            }
        } else {
            LifecyclePayload::ExperimentCompleted { succeeded, stable }
        };
        self.publish(experiment.id(), payload).await;

        Ok(ReconcileOutcome::Done)
    }

    /// Delete the non-stable workload and tear down the experiment's routing
    /// rules. Absent objects are success.
    async fn cleanup(
        &self,
        experiment: &Experiment,
        stable: StableTarget,
    ) -> Result<(), ReconcileError> {
        let family = experiment.spec.target_ref.api_family;
        let unstable_key = match stable {
            StableTarget::Baseline => experiment.candidate_key(),
            StableTarget::Candidate => experiment.baseline_key(),
        };
        match self.cluster.delete_workload(family, &unstable_key).await {
            Ok(()) => info!(workload = %unstable_key, "deleted non-stable workload"),
            Err(ClusterError::NotFound(_)) => {}
            Err(err) if err.is_transient() => return Err(err.into()),
            Err(err) => {
                warn!(error = %err, workload = %unstable_key, "workload cleanup failed");
            }
        }
        match self.routing.teardown(&experiment.id()).await {
            Ok(()) => Ok(()),
            Err(RoutingError::Retryable(msg)) => Err(ReconcileError::Transient(msg)),
            Err(RoutingError::Fatal(msg)) => {
                warn!(error = %msg, "routing teardown rejected");
                Ok(())
            }
        }
    }

    /// Finalization: force-terminate if still running, install the stable
    /// routing, deregister from the cache, then remove the finalizer - the
    /// commit point for releasing the record.
    async fn finalize(
        &self,
        mut experiment: Experiment,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if !experiment.has_finalizer() {
            self.cache.remove_experiment(&experiment.id());
            return Ok(ReconcileOutcome::Done);
        }

        if !experiment.status.is_completed() {
            // Synthetic terminate pass with the override-failure reason; the
            // stable target for an unfinished deleted experiment is always
            // the baseline.
            experiment.spec.action = Some(ExperimentAction::Terminate(
                TerminationReason::OverrideFailure,
            ));
            let final_split = experiment.stable_target().final_split();
            match self.routing.apply_split(&experiment, final_split).await {
                Ok(()) => experiment.status.traffic_split = final_split,
                Err(err @ RoutingError::Retryable(_)) => return Err(err.into()),
                Err(RoutingError::Fatal(msg)) => {
                    warn!(error = %msg, "dataplane rejected final routing during finalization");
                }
            }
            experiment.status.set_condition(
                ConditionKind::ExperimentSucceeded,
                ConditionStatus::False,
                reasons::EXPERIMENT_DELETED,
                None,
            );
            experiment.status.set_condition(
                ConditionKind::ExperimentCompleted,
                ConditionStatus::True,
                reasons::EXPERIMENT_DELETED,
                None,
            );
            experiment.status.phase = ExperimentPhase::Completed;
            experiment.status.end_timestamp = Some(Utc::now());
            match self.cluster.update_experiment_status(&experiment).await {
                Ok(updated) => experiment = updated,
                // The record is on its way out; a lost status write is fine.
                Err(err) if err.is_conflict() => debug!("status write conflict during finalization"),
                Err(ClusterError::NotFound(_)) => {
                    self.cache.remove_experiment(&experiment.id());
                    return Ok(ReconcileOutcome::Done);
                }
                Err(err) => return Err(err.into()),
            }
            self.publish(
                experiment.id(),
                LifecyclePayload::ExperimentAborted {
                    reason: reasons::EXPERIMENT_DELETED.to_string(),
                },
            )
            .await;
        }

        self.cache.remove_experiment(&experiment.id());
        experiment.remove_finalizer();
        match self.cluster.update_experiment(&experiment).await {
            Ok(_) => {
                info!("released experiment record");
                Ok(ReconcileOutcome::Done)
            }
            Err(err) if err.is_conflict() => {
                debug!("finalizer removal conflict, relying on next event");
                Ok(ReconcileOutcome::Done)
            }
            Err(ClusterError::NotFound(_)) => Ok(ReconcileOutcome::Done),
            Err(err) => Err(err.into()),
        }
    }

    /// Load metric definitions when the spec names success criteria and the
    /// sync has not happened yet. Returns `Ok(None)` when the reconcile
    /// should stop here (sync failed and the failure was recorded).
    async fn sync_metrics(
        &self,
        experiment: &mut Experiment,
        persisted_status: &mut ExperimentStatus,
    ) -> Result<Option<()>, ReconcileError> {
        if experiment.status.condition_true(ConditionKind::MetricsSynced)
            || experiment.spec.analysis.success_criteria.is_empty()
        {
            return Ok(Some(()));
        }

        let names: Vec<String> = experiment
            .spec
            .analysis
            .success_criteria
            .iter()
            .map(|c| c.metric.clone())
            .collect();
        match self.metric_store.load_definitions(&names).await {
            Ok(definitions) => {
                if experiment.metrics != definitions {
                    experiment.metrics = definitions;
                    match self.cluster.update_experiment(experiment).await {
                        Ok(updated) => {
                            // A main-resource write does not carry the status
                            // subresource; keep the in-memory status pending
                            // its own write.
                            let status = std::mem::take(&mut experiment.status);
                            *experiment = updated;
                            experiment.status = status;
                        }
                        Err(err) if err.is_conflict() => {
                            debug!("metrics write conflict, deferring to next event");
                            return Ok(None);
                        }
                        Err(ClusterError::NotFound(_)) => return Ok(None),
                        Err(err) => return Err(err.into()),
                    }
                }
                experiment.status.set_condition(
                    ConditionKind::MetricsSynced,
                    ConditionStatus::True,
                    reasons::METRICS_LOADED,
                    None,
                );
                Ok(Some(()))
            }
            Err(err) => {
                warn!(error = %err, "metric sync failed");
                experiment.status.set_condition(
                    ConditionKind::MetricsSynced,
                    ConditionStatus::False,
                    reasons::METRIC_SYNC_FAILED,
                    Some(err.to_string()),
                );
                self.persist_status(experiment, persisted_status).await?;
                Ok(None)
            }
        }
    }

    /// Record a terminal validation condition. No requeue: a spec fix bumps
    /// the generation and re-admits the record.
    async fn fail_validation(
        &self,
        mut experiment: Experiment,
        persisted_status: &mut ExperimentStatus,
        reason: String,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        warn!(reason = %reason, "experiment spec rejected");
        experiment.status.set_condition(
            ConditionKind::ExperimentCompleted,
            ConditionStatus::False,
            reasons::VALIDATION_FAILED,
            Some(reason),
        );
        self.persist_status(&mut experiment, persisted_status)
            .await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Record a routing failure: retryable errors go back to the dispatcher,
    /// fatal ones become a terminal condition.
    async fn routing_failure(
        &self,
        mut experiment: Experiment,
        persisted_status: &mut ExperimentStatus,
        err: RoutingError,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if err.is_retryable() {
            return Err(err.into());
        }
        warn!(error = %err, "dataplane rejected routing rules");
        experiment.status.set_condition(
            ConditionKind::RoutingRulesReady,
            ConditionStatus::False,
            reasons::ROUTING_REJECTED,
            Some(err.to_string()),
        );
        self.persist_status(&mut experiment, persisted_status)
            .await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Write the status subresource when it drifted from the last persisted
    /// snapshot. Returns false when a benign conflict (or a vanished record)
    /// swallowed the write; callers should stop advancing in that case.
    async fn persist_status(
        &self,
        experiment: &mut Experiment,
        persisted_status: &mut ExperimentStatus,
    ) -> Result<bool, ReconcileError> {
        if experiment.status == *persisted_status {
            return Ok(true);
        }
        match self.cluster.update_experiment_status(experiment).await {
            Ok(updated) => {
                *experiment = updated;
                *persisted_status = experiment.status.clone();
                Ok(true)
            }
            Err(err) if err.is_conflict() => {
                debug!("status write conflict, deferring to next event");
                Ok(false)
            }
            Err(ClusterError::NotFound(_)) => {
                debug!("experiment vanished mid-reconcile, dropping");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Best-effort lifecycle notification.
    async fn publish(&self, id: ExperimentId, payload: LifecyclePayload) {
        let event = crate::domain::ports::LifecycleEvent::new(id, payload);
        if let Err(err) = self.notifier.publish(event).await {
            warn!(error = %err, "lifecycle notification failed");
        }
    }
}

fn ensure_active(cancel: &ShutdownSignal) -> Result<(), ReconcileError> {
    if *cancel.borrow() {
        Err(ReconcileError::Canceled)
    } else {
        Ok(())
    }
}

fn to_std(duration: chrono::Duration) -> StdDuration {
    duration.to_std().unwrap_or(StdDuration::ZERO)
}
