//! Domain models for the canaryd controller.

pub mod config;
pub mod experiment;
pub mod target;

pub use config::{AnalyticsConfig, BackoffConfig, ControllerConfig, LoggingConfig};
pub use experiment::{
    Analysis, ApiFamily, CleanupPolicy, Condition, ConditionKind, ConditionStatus, Experiment,
    ExperimentAction, ExperimentId, ExperimentMeta, ExperimentPhase, ExperimentSpec,
    ExperimentStatus, MetricDefinition, StableTarget, Strategy, SuccessCriterion, TargetRef,
    TerminationReason, ToleranceType, TrafficControl, TrafficSplit, EXPERIMENT_FINALIZER,
};
pub use target::{ObjectKey, Observation, TargetBundle, TargetReference};
