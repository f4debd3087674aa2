//! Target resolver - observes the cluster for an experiment's three targets.
//!
//! Resolution is purely observational: the resolver never creates workloads.
//! Each reconcile re-reads the named objects fresh; the index cache presence
//! marks are updated as a side effect so later cluster events for these keys
//! are classified correctly.

use std::sync::Arc;

use crate::domain::errors::ClusterError;
use crate::domain::models::{
    Experiment, ObjectKey, Observation, TargetBundle, TargetReference,
};
use crate::domain::ports::ClusterClient;
use crate::services::IndexCache;

/// Resolves baseline/candidate workloads and the front-end service.
pub struct TargetResolver {
    cluster: Arc<dyn ClusterClient>,
    cache: Arc<IndexCache>,
}

impl TargetResolver {
    pub fn new(cluster: Arc<dyn ClusterClient>, cache: Arc<IndexCache>) -> Self {
        Self { cluster, cache }
    }

    /// Read the three named objects from the cluster.
    ///
    /// A transient read error surfaces as `Err` and is retryable; a missing
    /// object is an observation recorded in the returned bundle, not an
    /// error.
    pub async fn resolve(&self, experiment: &Experiment) -> Result<TargetBundle, ClusterError> {
        let family = experiment.spec.target_ref.api_family;

        let service_key = experiment.service_key();
        let service = self.cluster.get_service(&service_key).await?;
        self.mark_service(&service_key, service);

        let baseline_key = experiment.baseline_key();
        let baseline = self.cluster.get_workload(family, &baseline_key).await?;
        self.mark_deployment(&baseline_key, baseline);

        let candidate_key = experiment.candidate_key();
        let candidate = self.cluster.get_workload(family, &candidate_key).await?;
        self.mark_deployment(&candidate_key, candidate);

        Ok(TargetBundle {
            service: TargetReference {
                key: service_key,
                observation: service,
            },
            baseline: TargetReference {
                key: baseline_key,
                observation: baseline,
            },
            candidate: TargetReference {
                key: candidate_key,
                observation: candidate,
            },
        })
    }

    fn mark_deployment(&self, key: &ObjectKey, observation: Observation) {
        match observation {
            Observation::Present => self.cache.mark_target_deployment_found(key),
            Observation::Missing => self.cache.mark_target_deployment_missing(key),
        };
    }

    fn mark_service(&self, key: &ObjectKey, observation: Observation) {
        match observation {
            Observation::Present => self.cache.mark_target_service_found(key),
            Observation::Missing => self.cache.mark_target_service_missing(key),
        };
    }
}
