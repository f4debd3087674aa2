//! Property tests for the index cache symmetry law: every forward edge
//! (target key -> experiment) has a reverse edge (experiment -> target key)
//! and vice versa, including under shared targets and partial removal.

mod common;

use proptest::prelude::*;

use canaryd::domain::models::ExperimentId;
use canaryd::services::IndexCache;
use common::experiment;

/// Compact generator: experiment name index plus pool indices for the
/// service/baseline/candidate names. Small pools force key sharing across
/// experiments.
fn experiments_strategy() -> impl Strategy<Value = Vec<(u8, u8, u8, u8)>> {
    prop::collection::vec((0u8..8, 0u8..3, 0u8..3, 0u8..3), 1..10)
}

/// Distinct experiment names; a later descriptor with the same name would
/// just re-register over the earlier one.
fn dedup_by_name(descriptors: Vec<(u8, u8, u8, u8)>) -> Vec<(u8, u8, u8, u8)> {
    let mut by_name = std::collections::BTreeMap::new();
    for descriptor in descriptors {
        by_name.insert(descriptor.0, descriptor);
    }
    by_name.into_values().collect()
}

fn build(descriptor: (u8, u8, u8, u8)) -> canaryd::domain::models::Experiment {
    let (name, service, baseline, candidate) = descriptor;
    let mut exp = experiment(&format!("exp-{name}"), "props");
    exp.spec.target_ref.service_name = format!("svc-{service}");
    exp.spec.baseline_name = format!("workload-{baseline}");
    exp.spec.candidate_name = format!("workload-{candidate}");
    exp
}

proptest! {
    #[test]
    fn forward_and_reverse_edges_stay_symmetric(descriptors in experiments_strategy()) {
        let cache = IndexCache::new();
        let experiments: Vec<_> = dedup_by_name(descriptors).into_iter().map(build).collect();
        for exp in &experiments {
            cache.register_experiment(exp);
        }

        // Every inverse edge has a live forward edge.
        for exp in &experiments {
            let id = exp.id();
            let keys = cache.target_keys(&id).expect("registered experiment has keys");
            prop_assert!(cache.service_to_experiment(&keys[0]).is_some());
            prop_assert!(cache.deployment_to_experiment(&keys[1]).is_some());
            prop_assert!(cache.deployment_to_experiment(&keys[2]).is_some());
        }

        // Every forward lookup answers with an experiment whose inverse edge
        // contains the queried key.
        for exp in &experiments {
            let key = exp.baseline_key();
            let owner = cache.deployment_to_experiment(&key).unwrap();
            let owner_keys = cache.target_keys(&owner).unwrap();
            prop_assert!(owner_keys[1] == key || owner_keys[2] == key);

            let service = exp.service_key();
            let owner = cache.service_to_experiment(&service).unwrap();
            let owner_keys = cache.target_keys(&owner).unwrap();
            prop_assert_eq!(&owner_keys[0], &service);
        }
    }

    #[test]
    fn removal_leaves_no_stale_edges(
        descriptors in experiments_strategy(),
        keep_mask in prop::collection::vec(any::<bool>(), 10),
    ) {
        let cache = IndexCache::new();
        let experiments: Vec<_> = dedup_by_name(descriptors).into_iter().map(build).collect();
        for exp in &experiments {
            cache.register_experiment(exp);
        }

        let mut survivors: Vec<ExperimentId> = Vec::new();
        for (i, exp) in experiments.iter().enumerate() {
            let id = exp.id();
            if keep_mask.get(i).copied().unwrap_or(false) && !survivors.contains(&id) {
                survivors.push(id);
            } else {
                cache.remove_experiment(&id);
            }
        }

        // Removed experiments lose their inverse edges.
        for exp in &experiments {
            let id = exp.id();
            if !survivors.contains(&id) {
                prop_assert!(cache.target_keys(&id).is_none());
            }
        }

        // Surviving forward lookups only ever answer with survivors that
        // really reference the key.
        for exp in &experiments {
            for key in [exp.baseline_key(), exp.candidate_key()] {
                if let Some(owner) = cache.deployment_to_experiment(&key) {
                    prop_assert!(survivors.contains(&owner));
                    let owner_keys = cache.target_keys(&owner).unwrap();
                    prop_assert!(owner_keys[1] == key || owner_keys[2] == key);
                }
            }
            if let Some(owner) = cache.service_to_experiment(&exp.service_key()) {
                prop_assert!(survivors.contains(&owner));
            }
        }

        // Full teardown leaves the cache empty.
        for id in &survivors {
            cache.remove_experiment(id);
        }
        prop_assert!(cache.is_empty());
        for exp in &experiments {
            prop_assert!(cache.deployment_to_experiment(&exp.baseline_key()).is_none());
            prop_assert!(cache.deployment_to_experiment(&exp.candidate_key()).is_none());
            prop_assert!(cache.service_to_experiment(&exp.service_key()).is_none());
        }
    }
}
