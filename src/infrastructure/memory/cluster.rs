//! In-memory cluster backend.
//!
//! Implements the cluster port against in-process state with injectable
//! faults (write conflicts, transient read failures). Powers the `simulate`
//! harness and the integration tests; production deployments wire a real
//! cluster client instead.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::ClusterError;
use crate::domain::models::{
    ApiFamily, Experiment, ExperimentId, ExperimentSpec, ObjectKey, Observation,
};
use crate::domain::ports::ClusterClient;

#[derive(Debug, Default)]
struct ClusterState {
    experiments: HashMap<ExperimentId, Experiment>,
    workloads: HashSet<ObjectKey>,
    services: HashSet<ObjectKey>,
    /// Next N status writes fail with a conflict.
    conflict_status_writes: u32,
    /// Next N record fetches fail transiently.
    transient_get_failures: u32,
    status_write_count: u64,
}

/// Cluster client backed by process-local state.
#[derive(Debug, Default)]
pub struct MemoryCluster {
    state: Mutex<ClusterState>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh experiment record with version bookkeeping reset.
    pub fn put_experiment(&self, mut experiment: Experiment) {
        experiment.metadata.generation = experiment.metadata.generation.max(1);
        experiment.metadata.resource_version = experiment.metadata.resource_version.max(1);
        let id = experiment.id();
        self.lock().experiments.insert(id, experiment);
    }

    /// Apply an operator spec edit: bumps generation and resource version.
    pub fn edit_spec(&self, id: &ExperimentId, edit: impl FnOnce(&mut ExperimentSpec)) -> bool {
        let mut state = self.lock();
        let Some(stored) = state.experiments.get_mut(id) else {
            return false;
        };
        edit(&mut stored.spec);
        stored.metadata.generation += 1;
        stored.metadata.resource_version += 1;
        true
    }

    /// Request deletion: sets the deletion timestamp. The record is removed
    /// for real once its finalizers are gone.
    pub fn mark_deleted(&self, id: &ExperimentId) -> bool {
        let mut state = self.lock();
        let Some(stored) = state.experiments.get_mut(id) else {
            return false;
        };
        if stored.metadata.deletion_timestamp.is_none() {
            stored.metadata.deletion_timestamp = Some(Utc::now());
            stored.metadata.resource_version += 1;
        }
        if stored.metadata.finalizers.is_empty() {
            state.experiments.remove(id);
        }
        true
    }

    /// Current stored record, for assertions.
    pub fn experiment(&self, id: &ExperimentId) -> Option<Experiment> {
        self.lock().experiments.get(id).cloned()
    }

    pub fn contains_experiment(&self, id: &ExperimentId) -> bool {
        self.lock().experiments.contains_key(id)
    }

    pub fn add_workload(&self, key: ObjectKey) {
        self.lock().workloads.insert(key);
    }

    pub fn remove_workload(&self, key: &ObjectKey) {
        self.lock().workloads.remove(key);
    }

    pub fn has_workload(&self, key: &ObjectKey) -> bool {
        self.lock().workloads.contains(key)
    }

    pub fn add_service(&self, key: ObjectKey) {
        self.lock().services.insert(key);
    }

    pub fn remove_service(&self, key: &ObjectKey) {
        self.lock().services.remove(key);
    }

    /// Fail the next `count` status writes with a conflict.
    pub fn inject_status_conflicts(&self, count: u32) {
        self.lock().conflict_status_writes = count;
    }

    /// Fail the next `count` record fetches transiently.
    pub fn inject_transient_get_failures(&self, count: u32) {
        self.lock().transient_get_failures = count;
    }

    /// Total status subresource writes accepted.
    pub fn status_write_count(&self) -> u64 {
        self.lock().status_write_count
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl ClusterClient for MemoryCluster {
    async fn get_experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, ClusterError> {
        let mut state = self.lock();
        if state.transient_get_failures > 0 {
            state.transient_get_failures -= 1;
            return Err(ClusterError::Transient("connection reset".to_string()));
        }
        Ok(state.experiments.get(id).cloned())
    }

    async fn update_experiment(&self, experiment: &Experiment) -> Result<Experiment, ClusterError> {
        let id = experiment.id();
        let mut state = self.lock();
        let Some(stored) = state.experiments.get_mut(&id) else {
            return Err(ClusterError::NotFound(id.to_string()));
        };
        if stored.metadata.resource_version != experiment.metadata.resource_version {
            return Err(ClusterError::Conflict(id.to_string()));
        }
        // The status subresource is untouched by a main-resource write.
        stored.metadata = experiment.metadata.clone();
        stored.spec = experiment.spec.clone();
        stored.metrics = experiment.metrics.clone();
        stored.metadata.resource_version += 1;

        // Garbage-collect once the last finalizer is gone from a deleting
        // record.
        if stored.metadata.deletion_timestamp.is_some() && stored.metadata.finalizers.is_empty() {
            let released = stored.clone();
            state.experiments.remove(&id);
            return Ok(released);
        }
        Ok(stored.clone())
    }

    async fn update_experiment_status(
        &self,
        experiment: &Experiment,
    ) -> Result<Experiment, ClusterError> {
        let id = experiment.id();
        let mut state = self.lock();
        if state.conflict_status_writes > 0 {
            state.conflict_status_writes -= 1;
            return Err(ClusterError::Conflict(id.to_string()));
        }
        let Some(stored) = state.experiments.get_mut(&id) else {
            return Err(ClusterError::NotFound(id.to_string()));
        };
        if stored.metadata.resource_version != experiment.metadata.resource_version {
            return Err(ClusterError::Conflict(id.to_string()));
        }
        stored.status = experiment.status.clone();
        stored.metadata.resource_version += 1;
        let updated = stored.clone();
        state.status_write_count += 1;
        Ok(updated)
    }

    async fn get_workload(
        &self,
        _family: ApiFamily,
        key: &ObjectKey,
    ) -> Result<Observation, ClusterError> {
        let state = self.lock();
        Ok(if state.workloads.contains(key) {
            Observation::Present
        } else {
            Observation::Missing
        })
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Observation, ClusterError> {
        let state = self.lock();
        Ok(if state.services.contains(key) {
            Observation::Present
        } else {
            Observation::Missing
        })
    }

    async fn delete_workload(
        &self,
        _family: ApiFamily,
        key: &ObjectKey,
    ) -> Result<(), ClusterError> {
        // Deleting an absent workload is success.
        self.lock().workloads.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tokio_test::block_on;

    use super::*;
    use crate::domain::models::{
        Analysis, CleanupPolicy, ExperimentMeta, ExperimentStatus, Strategy, TargetRef,
        TrafficControl,
    };

    fn experiment(name: &str) -> Experiment {
        Experiment {
            metadata: ExperimentMeta {
                name: name.to_string(),
                namespace: "default".to_string(),
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
                    success_criteria: vec![],
                },
                cleanup_policy: CleanupPolicy::None,
                action: None,
            },
            metrics: BTreeMap::new(),
            status: ExperimentStatus::default(),
        }
    }

    #[test]
    fn test_stale_token_conflicts() {
        block_on(async {
            let cluster = MemoryCluster::new();
            let exp = experiment("reviews");
            let id = exp.id();
            cluster.put_experiment(exp.clone());

            // A write with the stored token succeeds and refreshes it.
            let updated = cluster.update_experiment(&exp).await.unwrap();
            assert_eq!(updated.metadata.resource_version, 2);

            // Re-submitting the stale token conflicts.
            let err = cluster.update_experiment(&exp).await.unwrap_err();
            assert!(err.is_conflict());
            let err = cluster.update_experiment_status(&exp).await.unwrap_err();
            assert!(err.is_conflict());

            assert_eq!(
                cluster.experiment(&id).unwrap().metadata.resource_version,
                2
            );
        });
    }

    #[test]
    fn test_main_resource_write_preserves_status() {
        block_on(async {
            let cluster = MemoryCluster::new();
            let mut exp = experiment("reviews");
            exp.status.current_iteration = 2;
            cluster.put_experiment(exp.clone());

            // A main-resource write carrying a divergent status leaves the
            // stored status untouched.
            let mut edited = exp.clone();
            edited.status.current_iteration = 99;
            edited.metadata.finalizers.push("x".to_string());
            cluster.update_experiment(&edited).await.unwrap();

            let stored = cluster.experiment(&exp.id()).unwrap();
            assert_eq!(stored.status.current_iteration, 2);
            assert_eq!(stored.metadata.finalizers, vec!["x".to_string()]);
        });
    }

    #[test]
    fn test_deletion_gc_waits_for_finalizers() {
        block_on(async {
            let cluster = MemoryCluster::new();
            let mut exp = experiment("reviews");
            exp.add_finalizer();
            cluster.put_experiment(exp.clone());
            let id = exp.id();

            // Deletion with a finalizer present only marks the record.
            cluster.mark_deleted(&id);
            assert!(cluster.contains_experiment(&id));

            // Removing the finalizer through a write garbage-collects it.
            let mut releasing = cluster.experiment(&id).unwrap();
            releasing.remove_finalizer();
            cluster.update_experiment(&releasing).await.unwrap();
            assert!(!cluster.contains_experiment(&id));
        });
    }
}
