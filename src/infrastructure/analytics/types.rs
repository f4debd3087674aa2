//! Analytics wire types.
//!
//! JSON request/response bodies for the check-and-increment analytics
//! service. The response schema is preserved verbatim; compatibility with
//! existing analytics deployments matters more than naming taste.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::models::{Experiment, SuccessCriterion, ToleranceType, TrafficSplit};

/// Descriptor of one workload version in the analytics request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadDescriptor {
    pub name: String,
    pub namespace: String,
    /// Metric name to instantiated query template.
    #[serde(default)]
    pub metric_queries: BTreeMap<String, String>,
}

/// One success criterion as forwarded to the analytics service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionDescriptor {
    pub metric: String,
    pub tolerance: f64,
    pub tolerance_type: ToleranceType,
    pub sample_size: u32,
    pub stop_on_failure: bool,
}

impl From<&SuccessCriterion> for CriterionDescriptor {
    fn from(c: &SuccessCriterion) -> Self {
        Self {
            metric: c.metric.clone(),
            tolerance: c.tolerance,
            tolerance_type: c.tolerance_type,
            sample_size: c.sample_size,
            stop_on_failure: c.stop_on_failure,
        }
    }
}

/// Request body POSTed to the analytics strategy route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    pub name: String,
    pub namespace: String,
    pub iteration_number: u32,
    pub baseline: WorkloadDescriptor,
    pub candidate: WorkloadDescriptor,
    #[serde(default)]
    pub success_criteria: Vec<CriterionDescriptor>,
    /// Opaque session-continuity blob from the previous response; absent on
    /// the first call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_state: Option<serde_json::Value>,
}

impl AnalyticsRequest {
    /// Build the request for the experiment's next iteration. Metric queries
    /// come from the definitions recorded at metrics sync.
    pub fn for_experiment(experiment: &Experiment) -> Self {
        let metric_queries: BTreeMap<String, String> = experiment
            .metrics
            .iter()
            .map(|(name, def)| (name.clone(), def.query_template.clone()))
            .collect();
        let namespace = experiment.metadata.namespace.clone();
        Self {
            name: experiment.metadata.name.clone(),
            namespace: namespace.clone(),
            iteration_number: experiment.status.current_iteration,
            baseline: WorkloadDescriptor {
                name: experiment.spec.baseline_name.clone(),
                namespace: namespace.clone(),
                metric_queries: metric_queries.clone(),
            },
            candidate: WorkloadDescriptor {
                name: experiment.spec.candidate_name.clone(),
                namespace,
                metric_queries,
            },
            success_criteria: experiment
                .spec
                .analysis
                .success_criteria
                .iter()
                .map(CriterionDescriptor::from)
                .collect(),
            last_state: experiment.status.last_state.clone(),
        }
    }
}

/// Traffic split as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireTrafficSplit {
    pub baseline: u32,
    pub candidate: u32,
}

impl From<WireTrafficSplit> for TrafficSplit {
    fn from(w: WireTrafficSplit) -> Self {
        Self::new(w.baseline, w.candidate)
    }
}

/// Response body from the analytics strategy route. Field names are wire
/// schema, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub new_traffic_split: WireTrafficSplit,
    /// Opaque assessment payload stashed into the experiment status.
    #[serde(default)]
    pub assessment: serde_json::Value,
    /// Opaque session-continuity blob echoed in the next request.
    #[serde(default)]
    pub last_state: serde_json::Value,
    pub success: bool,
    pub stop: bool,
    #[serde(default)]
    pub message: String,
}
