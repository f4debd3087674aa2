//! Experiment domain model.
//!
//! An Experiment is the canonical record driving a progressive-delivery
//! rollout: a baseline workload, a candidate workload, a front-end service,
//! a traffic-control schedule, and success criteria evaluated by an external
//! analytics service. The controller owns `status`; operators own `spec`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Finalizer token recording that this controller still owns cleanup for a
/// record. The string is stable across controller versions.
pub const EXPERIMENT_FINALIZER: &str = "canaryd.io/experiment-finalizer";

/// Identity of an experiment record: name plus namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperimentId {
    pub name: String,
    pub namespace: String,
}

impl ExperimentId {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Workload API family the experiment targets.
///
/// The core state machine is shared across families; only the target and
/// routing adapters differ. Records carrying a family this build does not
/// recognize deserialize to `Unsupported` and get a terminal validation
/// condition instead of crashing the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiFamily {
    Kubernetes,
    Knative,
    #[serde(other)]
    Unsupported,
}

impl ApiFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kubernetes => "kubernetes",
            Self::Knative => "knative",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Reference to the front-end service whose traffic is split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRef {
    /// Workload API family of the baseline/candidate pair.
    pub api_family: ApiFamily,
    /// Name of the front-end service in the experiment's namespace.
    pub service_name: String,
}

/// Traffic-shifting strategy implemented by the analytics service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    CheckAndIncrement,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::CheckAndIncrement
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckAndIncrement => "check_and_increment",
        }
    }
}

/// Schedule governing how fast traffic may shift toward the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficControl {
    /// Total number of analytics iterations before natural completion. At
    /// least 1.
    pub max_iterations: u32,
    /// Wall-clock spacing between iterations, in seconds. Positive.
    pub interval_seconds: u64,
    /// Maximum percentage-point change of the candidate share per iteration,
    /// in (0, 100].
    pub traffic_step_size: f64,
    /// Strategy the analytics service applies.
    #[serde(default)]
    pub strategy: Strategy,
}

impl TrafficControl {
    /// Iteration spacing as a chrono duration.
    pub fn interval(&self) -> Duration {
        Duration::seconds(i64::try_from(self.interval_seconds).unwrap_or(i64::MAX))
    }
}

/// How a success criterion's tolerance is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToleranceType {
    /// Absolute bound on the metric value.
    Threshold,
    /// Bound on the deviation relative to the baseline.
    Delta,
}

/// One criterion the analytics service evaluates each iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessCriterion {
    /// Name of the metric, resolved against the metric store.
    pub metric: String,
    pub tolerance: f64,
    pub tolerance_type: ToleranceType,
    /// Minimum sample count before the criterion is assessable.
    pub sample_size: u32,
    /// When true, a failing assessment halts the experiment.
    #[serde(default)]
    pub stop_on_failure: bool,
}

/// Where and how the experiment is assessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Base URL of the external analytics service.
    pub analytics_endpoint: String,
    /// Ordered criteria forwarded to the analytics service.
    #[serde(default)]
    pub success_criteria: Vec<SuccessCriterion>,
}

/// What happens to the losing workload at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Leave both workloads in place.
    None,
    /// Delete the non-stable workload.
    Delete,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self::None
    }
}

/// Reason attached to an operator-initiated termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    SuccessWithBaseline,
    SuccessWithCandidate,
    Abort,
    OverrideFailure,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuccessWithBaseline => "success_with_baseline",
            Self::SuccessWithCandidate => "success_with_candidate",
            Self::Abort => "abort",
            Self::OverrideFailure => "override_failure",
        }
    }

    /// Whether this reason represents an abnormal end of the experiment.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Abort | Self::OverrideFailure)
    }
}

/// One-shot operator override carried in the spec.
///
/// The controller never clears a consumed terminate action; clearing would be
/// indistinguishable from an operator reverting it. The event filter rejects
/// such reversion to keep consumption exactly-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentAction {
    Pause,
    Resume,
    Terminate(TerminationReason),
}

impl ExperimentAction {
    pub fn is_terminate(&self) -> bool {
        matches!(self, Self::Terminate(_))
    }

    pub fn is_pause(&self) -> bool {
        matches!(self, Self::Pause)
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        match self {
            Self::Terminate(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Declarative half of the experiment record. Only operators edit the spec;
/// the controller consumes it read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub target_ref: TargetRef,
    /// Name of the baseline workload in the experiment's namespace.
    pub baseline_name: String,
    /// Name of the candidate workload in the experiment's namespace.
    pub candidate_name: String,
    pub traffic_control: TrafficControl,
    pub analysis: Analysis,
    #[serde(default)]
    pub cleanup_policy: CleanupPolicy,
    /// One-shot operator override channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<ExperimentAction>,
}

impl ExperimentSpec {
    /// Validate operator-supplied fields. Violations are terminal: the record
    /// gets a validation condition and is never requeued.
    pub fn validate(&self) -> Result<(), String> {
        if self.traffic_control.max_iterations < 1 {
            return Err("traffic_control.max_iterations must be at least 1".to_string());
        }
        if self.traffic_control.interval_seconds == 0 {
            return Err("traffic_control.interval_seconds must be positive".to_string());
        }
        let step = self.traffic_control.traffic_step_size;
        if !(step > 0.0 && step <= 100.0) {
            return Err(format!(
                "traffic_control.traffic_step_size must be in (0, 100], got {step}"
            ));
        }
        if self.baseline_name.is_empty() || self.candidate_name.is_empty() {
            return Err("baseline_name and candidate_name cannot be empty".to_string());
        }
        if self.target_ref.service_name.is_empty() {
            return Err("target_ref.service_name cannot be empty".to_string());
        }
        if self.analysis.analytics_endpoint.is_empty() {
            return Err("analysis.analytics_endpoint cannot be empty".to_string());
        }
        Ok(())
    }

    /// Whether the operator has requested termination.
    pub fn wants_termination(&self) -> bool {
        self.action.is_some_and(|a| a.is_terminate())
    }

    /// Whether the operator has paused progression.
    pub fn is_paused(&self) -> bool {
        self.action.is_some_and(|a| a.is_pause())
    }
}

/// Definition of a metric referenced by success criteria, loaded once from
/// the external metric store and recorded on the experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDefinition {
    /// Query template the analytics service instantiates per workload.
    pub query_template: String,
    /// Query template producing the observed sample count.
    pub sample_size_template: String,
}

/// Record metadata mirroring the cluster's object envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub name: String,
    pub namespace: String,
    /// Bumped by the cluster on every spec edit.
    #[serde(default)]
    pub generation: u64,
    /// Optimistic-concurrency token arbitrating concurrent writes.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub finalizers: Vec<String>,
    /// Set by the cluster when deletion has been requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

/// Lifecycle phase of an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentPhase {
    Initializing,
    Progressing,
    Completed,
}

impl Default for ExperimentPhase {
    fn default() -> Self {
        Self::Initializing
    }
}

impl ExperimentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Progressing => "progressing",
            Self::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Truth value of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Kinds of conditions the controller records on the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    TargetsProvided,
    MetricsSynced,
    AnalyticsServiceNormal,
    RoutingRulesReady,
    ExperimentSucceeded,
    ExperimentCompleted,
}

impl ConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetsProvided => "targets_provided",
            Self::MetricsSynced => "metrics_synced",
            Self::AnalyticsServiceNormal => "analytics_service_normal",
            Self::RoutingRulesReady => "routing_rules_ready",
            Self::ExperimentSucceeded => "experiment_succeeded",
            Self::ExperimentCompleted => "experiment_completed",
        }
    }
}

/// One observed condition with its transition bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_transition_time: DateTime<Utc>,
}

/// Percentage split of ingress traffic between baseline and candidate.
///
/// The sum is 0 before the first routing install and exactly 100 afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficSplit {
    pub baseline: u32,
    pub candidate: u32,
}

impl TrafficSplit {
    pub fn new(baseline: u32, candidate: u32) -> Self {
        Self {
            baseline,
            candidate,
        }
    }

    /// All traffic on the baseline.
    pub fn baseline_all() -> Self {
        Self::new(100, 0)
    }

    /// All traffic on the candidate.
    pub fn candidate_all() -> Self {
        Self::new(0, 100)
    }

    pub fn sum(&self) -> u32 {
        self.baseline + self.candidate
    }

    /// Whether routing has been installed for this split.
    pub fn is_installed(&self) -> bool {
        self.sum() == 100
    }

    /// Bound a proposed split so the candidate share moves by at most
    /// `step` percentage points from `current`, renormalizing the baseline
    /// share so the sum stays 100.
    ///
    /// A fractional step bounds the integer move downward: with step 12.5 the
    /// candidate may move at most 12 points.
    pub fn clamp_step(current: Self, proposed: Self, step: f64) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let bound = step.max(0.0).floor() as i64;
        let delta = i64::from(proposed.candidate) - i64::from(current.candidate);
        let clamped = delta.clamp(-bound, bound);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let candidate = (i64::from(current.candidate) + clamped).clamp(0, 100) as u32;
        Self {
            baseline: 100 - candidate,
            candidate,
        }
    }
}

impl std::fmt::Display for TrafficSplit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.baseline, self.candidate)
    }
}

/// Which workload receives 100% of traffic at completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StableTarget {
    Baseline,
    Candidate,
}

impl StableTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Candidate => "candidate",
        }
    }

    /// Final split routing all traffic to this target.
    pub fn final_split(&self) -> TrafficSplit {
        match self {
            Self::Baseline => TrafficSplit::baseline_all(),
            Self::Candidate => TrafficSplit::candidate_all(),
        }
    }
}

/// Controller-owned half of the experiment record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentStatus {
    #[serde(default)]
    pub phase: ExperimentPhase,
    #[serde(default)]
    pub conditions: BTreeMap<ConditionKind, Condition>,
    #[serde(default)]
    pub traffic_split: TrafficSplit,
    #[serde(default)]
    pub current_iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_increment_time: Option<DateTime<Utc>>,
    /// Opaque payload from the last analytics response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<serde_json::Value>,
    /// Opaque session-continuity blob echoed back to the analytics service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_timestamp: Option<DateTime<Utc>>,
}

impl ExperimentStatus {
    /// Whether the status has been initialized by a first reconcile.
    pub fn initialized(&self) -> bool {
        self.create_timestamp.is_some()
    }

    /// First-sight initialization: Initializing phase, zero traffic split,
    /// no conditions, iteration 0.
    pub fn initialize(&mut self, now: DateTime<Utc>) {
        self.phase = ExperimentPhase::Initializing;
        self.conditions.clear();
        self.traffic_split = TrafficSplit::default();
        self.current_iteration = 0;
        self.last_increment_time = None;
        self.create_timestamp = Some(now);
    }

    /// Record a condition. The transition time is bumped only when the truth
    /// value changes; reason and message update freely.
    ///
    /// Returns true when anything observable changed.
    pub fn set_condition(
        &mut self,
        kind: ConditionKind,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: Option<String>,
    ) -> bool {
        let reason = Some(reason.into());
        match self.conditions.get_mut(&kind) {
            Some(existing) => {
                let mut changed = false;
                if existing.status != status {
                    existing.status = status;
                    existing.last_transition_time = Utc::now();
                    changed = true;
                }
                if existing.reason != reason {
                    existing.reason = reason;
                    changed = true;
                }
                if existing.message != message {
                    existing.message = message;
                    changed = true;
                }
                changed
            }
            None => {
                self.conditions.insert(
                    kind,
                    Condition {
                        status,
                        reason,
                        message,
                        last_transition_time: Utc::now(),
                    },
                );
                true
            }
        }
    }

    /// Truth value of a condition, `Unknown` when never recorded.
    pub fn condition(&self, kind: ConditionKind) -> ConditionStatus {
        self.conditions
            .get(&kind)
            .map_or(ConditionStatus::Unknown, |c| c.status)
    }

    pub fn condition_true(&self, kind: ConditionKind) -> bool {
        self.condition(kind) == ConditionStatus::True
    }

    /// Reason recorded for a condition, if any.
    pub fn condition_reason(&self, kind: ConditionKind) -> Option<&str> {
        self.conditions.get(&kind).and_then(|c| c.reason.as_deref())
    }

    /// Whether the experiment has reached its terminal state.
    pub fn is_completed(&self) -> bool {
        self.condition_true(ConditionKind::ExperimentCompleted)
    }

    /// Whether the next iteration is due against the wall clock.
    pub fn iteration_due(&self, interval: Duration, now: DateTime<Utc>) -> bool {
        self.last_increment_time
            .is_none_or(|last| now >= last + interval)
    }

    /// Time remaining until the next iteration is due; zero when overdue.
    pub fn time_until_due(&self, interval: Duration, now: DateTime<Utc>) -> Duration {
        match self.last_increment_time {
            Some(last) => (last + interval - now).max(Duration::zero()),
            None => Duration::zero(),
        }
    }
}

/// The canonical experiment record: metadata envelope, operator spec,
/// controller-populated metric definitions, and controller-owned status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub metadata: ExperimentMeta,
    pub spec: ExperimentSpec,
    /// Metric definitions resolved from the metric store, keyed by metric
    /// name. Populated once at first metrics sync.
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricDefinition>,
    #[serde(default)]
    pub status: ExperimentStatus,
}

impl Experiment {
    pub fn id(&self) -> ExperimentId {
        ExperimentId::new(self.metadata.name.clone(), self.metadata.namespace.clone())
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .iter()
            .any(|f| f == EXPERIMENT_FINALIZER)
    }

    pub fn add_finalizer(&mut self) {
        if !self.has_finalizer() {
            self.metadata
                .finalizers
                .push(EXPERIMENT_FINALIZER.to_string());
        }
    }

    pub fn remove_finalizer(&mut self) {
        self.metadata
            .finalizers
            .retain(|f| f != EXPERIMENT_FINALIZER);
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Key of the front-end service in the experiment's namespace.
    pub fn service_key(&self) -> super::target::ObjectKey {
        super::target::ObjectKey::new(
            self.spec.target_ref.service_name.clone(),
            self.metadata.namespace.clone(),
        )
    }

    /// Key of the baseline workload.
    pub fn baseline_key(&self) -> super::target::ObjectKey {
        super::target::ObjectKey::new(
            self.spec.baseline_name.clone(),
            self.metadata.namespace.clone(),
        )
    }

    /// Key of the candidate workload.
    pub fn candidate_key(&self) -> super::target::ObjectKey {
        super::target::ObjectKey::new(
            self.spec.candidate_name.clone(),
            self.metadata.namespace.clone(),
        )
    }

    /// Select the workload that receives 100% of traffic at completion.
    ///
    /// Operator terminate actions win; absent an action the last recorded
    /// assessment decides, defaulting to the baseline.
    pub fn stable_target(&self) -> StableTarget {
        if let Some(reason) = self.spec.action.and_then(|a| a.termination_reason()) {
            return match reason {
                TerminationReason::SuccessWithCandidate => StableTarget::Candidate,
                TerminationReason::SuccessWithBaseline
                | TerminationReason::Abort
                | TerminationReason::OverrideFailure => StableTarget::Baseline,
            };
        }
        if self.status.condition_true(ConditionKind::ExperimentSucceeded) {
            StableTarget::Candidate
        } else {
            StableTarget::Baseline
        }
    }
}
