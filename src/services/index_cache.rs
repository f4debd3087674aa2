//! Bidirectional index between target objects and experiments.
//!
//! Cluster events arrive keyed by target objects (workloads, services) while
//! the control loop's unit of work is an experiment. The cache absorbs that
//! asymmetry: a forward index from target key to the experiments referencing
//! it, with a presence mark per key, and an inverse index from experiment to
//! its three target keys. The mark helpers double as event deduplication:
//! a mark that changes nothing means the event is uninteresting.
//!
//! Mutators take a brief exclusive lock; mark helpers may fire from
//! event-filter context while reconcile workers register and remove
//! experiments.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::domain::models::{Experiment, ExperimentId, ObjectKey};

/// Last observed presence of a target key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presence {
    Unknown,
    Present,
    Missing,
}

/// Forward-index entry for one target key.
#[derive(Debug)]
struct TargetEntry {
    experiments: HashSet<ExperimentId>,
    presence: Presence,
}

impl TargetEntry {
    fn new() -> Self {
        Self {
            experiments: HashSet::new(),
            presence: Presence::Unknown,
        }
    }
}

/// Inverse-index entry: the three keys one experiment expects.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TargetKeys {
    service: ObjectKey,
    baseline: ObjectKey,
    candidate: ObjectKey,
}

#[derive(Debug, Default)]
struct CacheInner {
    /// experiment-id -> expected target keys
    experiments: HashMap<ExperimentId, TargetKeys>,
    /// workload key -> referencing experiments + presence
    deployments: HashMap<ObjectKey, TargetEntry>,
    /// service key -> referencing experiments + presence
    services: HashMap<ObjectKey, TargetEntry>,
}

/// In-memory bidirectional index shared between the dispatcher, the target
/// resolver, and the event filters.
#[derive(Debug, Default)]
pub struct IndexCache {
    inner: Mutex<CacheInner>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the experiment's three expected target keys with unknown
    /// initial presence. Idempotent; re-registration with changed keys
    /// replaces the old edges.
    pub fn register_experiment(&self, experiment: &Experiment) {
        let id = experiment.id();
        let keys = TargetKeys {
            service: experiment.service_key(),
            baseline: experiment.baseline_key(),
            candidate: experiment.candidate_key(),
        };

        let mut inner = self.lock();
        if inner.experiments.get(&id) == Some(&keys) {
            return;
        }
        Self::erase_edges(&mut inner, &id);
        inner
            .deployments
            .entry(keys.baseline.clone())
            .or_insert_with(TargetEntry::new)
            .experiments
            .insert(id.clone());
        inner
            .deployments
            .entry(keys.candidate.clone())
            .or_insert_with(TargetEntry::new)
            .experiments
            .insert(id.clone());
        inner
            .services
            .entry(keys.service.clone())
            .or_insert_with(TargetEntry::new)
            .experiments
            .insert(id.clone());
        inner.experiments.insert(id, keys);
    }

    /// Erase every edge for the experiment. Called at finalization so no
    /// stale forward edge outlives its record.
    pub fn remove_experiment(&self, id: &ExperimentId) {
        let mut inner = self.lock();
        Self::erase_edges(&mut inner, id);
        inner.experiments.remove(id);
    }

    /// Mark a workload key present. Returns true iff the key is referenced by
    /// at least one experiment and the mark transitioned it from
    /// missing/unknown to present: false means "uninteresting event,
    /// suppress".
    pub fn mark_target_deployment_found(&self, key: &ObjectKey) -> bool {
        Self::mark(&mut self.lock().deployments, key, Presence::Present)
    }

    /// Mark a workload key missing. Symmetric to
    /// [`mark_target_deployment_found`](Self::mark_target_deployment_found).
    pub fn mark_target_deployment_missing(&self, key: &ObjectKey) -> bool {
        Self::mark(&mut self.lock().deployments, key, Presence::Missing)
    }

    /// Mark a service key present.
    pub fn mark_target_service_found(&self, key: &ObjectKey) -> bool {
        Self::mark(&mut self.lock().services, key, Presence::Present)
    }

    /// Mark a service key missing.
    pub fn mark_target_service_missing(&self, key: &ObjectKey) -> bool {
        Self::mark(&mut self.lock().services, key, Presence::Missing)
    }

    /// Reverse lookup: any experiment referencing the workload key. With
    /// multiple referents any one is returned; the others are woken by their
    /// own events or requeue timers.
    pub fn deployment_to_experiment(&self, key: &ObjectKey) -> Option<ExperimentId> {
        self.lock()
            .deployments
            .get(key)
            .and_then(|e| e.experiments.iter().next().cloned())
    }

    /// Reverse lookup for service keys.
    pub fn service_to_experiment(&self, key: &ObjectKey) -> Option<ExperimentId> {
        self.lock()
            .services
            .get(key)
            .and_then(|e| e.experiments.iter().next().cloned())
    }

    /// Number of registered experiments.
    pub fn len(&self) -> usize {
        self.lock().experiments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().experiments.is_empty()
    }

    /// The three target keys registered for an experiment, in
    /// service/baseline/candidate order.
    pub fn target_keys(&self, id: &ExperimentId) -> Option<[ObjectKey; 3]> {
        self.lock().experiments.get(id).map(|k| {
            [
                k.service.clone(),
                k.baseline.clone(),
                k.candidate.clone(),
            ]
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // Mutex poisoning only happens if a panic escaped while holding the
        // lock; the cache is rebuilt from cluster state on restart, so
        // recover the inner value.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn mark(table: &mut HashMap<ObjectKey, TargetEntry>, key: &ObjectKey, to: Presence) -> bool {
        match table.get_mut(key) {
            Some(entry) => {
                let transitioned = entry.presence != to;
                entry.presence = to;
                transitioned && !entry.experiments.is_empty()
            }
            None => false,
        }
    }

    fn erase_edges(inner: &mut CacheInner, id: &ExperimentId) {
        let Some(keys) = inner.experiments.get(id).cloned() else {
            return;
        };
        Self::unlink(&mut inner.deployments, &keys.baseline, id);
        Self::unlink(&mut inner.deployments, &keys.candidate, id);
        Self::unlink(&mut inner.services, &keys.service, id);
    }

    fn unlink(table: &mut HashMap<ObjectKey, TargetEntry>, key: &ObjectKey, id: &ExperimentId) {
        if let Some(entry) = table.get_mut(key) {
            entry.experiments.remove(id);
            if entry.experiments.is_empty() {
                table.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::domain::models::{
        Analysis, ApiFamily, CleanupPolicy, Experiment, ExperimentMeta, ExperimentSpec,
        ExperimentStatus, Strategy, TargetRef, TrafficControl,
    };

    fn experiment(name: &str, namespace: &str) -> Experiment {
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
    fn test_register_is_idempotent() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);
        cache.register_experiment(&exp);
        assert_eq!(cache.len(), 1);
        assert!(cache
            .deployment_to_experiment(&exp.baseline_key())
            .is_some());
    }

    #[test]
    fn test_mark_found_requires_referent_and_transition() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");

        // Unreferenced key: uninteresting.
        assert!(!cache.mark_target_deployment_found(&ObjectKey::new("stranger", "bookinfo")));

        cache.register_experiment(&exp);

        // Unknown -> present: interesting.
        assert!(cache.mark_target_deployment_found(&exp.candidate_key()));
        // Present -> present: suppressed.
        assert!(!cache.mark_target_deployment_found(&exp.candidate_key()));
        // Present -> missing: interesting again.
        assert!(cache.mark_target_deployment_missing(&exp.candidate_key()));
        assert!(!cache.mark_target_deployment_missing(&exp.candidate_key()));
    }

    #[test]
    fn test_service_marks_use_service_table() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);

        assert!(cache.mark_target_service_found(&exp.service_key()));
        // The service key is not in the deployment table.
        assert!(!cache.mark_target_deployment_found(&exp.service_key()));
    }

    #[test]
    fn test_reverse_lookup() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);

        assert_eq!(
            cache.deployment_to_experiment(&exp.baseline_key()),
            Some(exp.id())
        );
        assert_eq!(
            cache.service_to_experiment(&exp.service_key()),
            Some(exp.id())
        );
        assert_eq!(
            cache.deployment_to_experiment(&ObjectKey::new("stranger", "bookinfo")),
            None
        );
    }

    #[test]
    fn test_remove_erases_all_edges() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);
        cache.remove_experiment(&exp.id());

        assert!(cache.is_empty());
        assert!(cache.deployment_to_experiment(&exp.baseline_key()).is_none());
        assert!(cache.deployment_to_experiment(&exp.candidate_key()).is_none());
        assert!(cache.service_to_experiment(&exp.service_key()).is_none());
        // Marks on erased keys are uninteresting.
        assert!(!cache.mark_target_deployment_found(&exp.baseline_key()));
    }

    #[test]
    fn test_shared_key_survives_one_removal() {
        let cache = IndexCache::new();
        let mut a = experiment("reviews", "bookinfo");
        let mut b = experiment("ratings", "bookinfo");
        // Both experiments reference the same candidate workload.
        a.spec.candidate_name = "shared-v2".to_string();
        b.spec.candidate_name = "shared-v2".to_string();
        cache.register_experiment(&a);
        cache.register_experiment(&b);

        let shared = ObjectKey::new("shared-v2", "bookinfo");
        cache.remove_experiment(&a.id());

        // The shared key still resolves to the surviving experiment.
        assert_eq!(cache.deployment_to_experiment(&shared), Some(b.id()));
        // But a's private keys are gone.
        assert!(cache.deployment_to_experiment(&a.baseline_key()).is_none());
    }

    #[test]
    fn test_reregistration_with_changed_keys_replaces_edges() {
        let cache = IndexCache::new();
        let mut exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);
        let old_candidate = exp.candidate_key();

        exp.spec.candidate_name = "reviews-v3".to_string();
        cache.register_experiment(&exp);

        assert!(cache.deployment_to_experiment(&old_candidate).is_none());
        assert_eq!(
            cache.deployment_to_experiment(&exp.candidate_key()),
            Some(exp.id())
        );
    }

    #[test]
    fn test_target_keys_inverse() {
        let cache = IndexCache::new();
        let exp = experiment("reviews", "bookinfo");
        cache.register_experiment(&exp);

        let keys = cache.target_keys(&exp.id()).unwrap();
        assert_eq!(keys[0], exp.service_key());
        assert_eq!(keys[1], exp.baseline_key());
        assert_eq!(keys[2], exp.candidate_key());
    }
}
