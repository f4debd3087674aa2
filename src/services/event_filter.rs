//! Event admission predicates.
//!
//! The control loop is level-triggered: events only decide *when* to wake the
//! dispatcher, never what to do. These predicates suppress wake-ups that
//! would reconcile to a no-op - status-only writes, the controller's own
//! finalizer and metrics writes, and workload churn no experiment references.

use std::sync::Arc;

use crate::domain::models::{Experiment, ObjectKey};
use crate::services::IndexCache;

/// Admission predicates for workload and service events, backed by the index
/// cache's presence marks.
pub struct WorkloadEventFilter {
    cache: Arc<IndexCache>,
}

impl WorkloadEventFilter {
    pub fn new(cache: Arc<IndexCache>) -> Self {
        Self { cache }
    }

    /// A workload appeared. Admit iff some experiment references it and the
    /// presence mark transitioned.
    pub fn admit_deployment_created(&self, key: &ObjectKey) -> bool {
        self.cache.mark_target_deployment_found(key)
    }

    /// A workload disappeared.
    pub fn admit_deployment_deleted(&self, key: &ObjectKey) -> bool {
        self.cache.mark_target_deployment_missing(key)
    }

    /// Workload updates never wake the dispatcher: targets are resolved
    /// fresh on every reconcile.
    pub fn admit_deployment_updated(&self) -> bool {
        false
    }

    /// A front-end service appeared.
    pub fn admit_service_created(&self, key: &ObjectKey) -> bool {
        self.cache.mark_target_service_found(key)
    }

    /// A front-end service disappeared.
    pub fn admit_service_deleted(&self, key: &ObjectKey) -> bool {
        self.cache.mark_target_service_missing(key)
    }

    /// Service updates never wake the dispatcher.
    pub fn admit_service_updated(&self) -> bool {
        false
    }
}

/// Admission predicates for experiment record events.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExperimentEventFilter;

impl ExperimentEventFilter {
    pub fn new() -> Self {
        Self
    }

    /// New records always reconcile.
    pub fn admit_create(&self, _experiment: &Experiment) -> bool {
        true
    }

    /// Deletions always reconcile: finalization must run.
    pub fn admit_delete(&self, _experiment: &Experiment) -> bool {
        true
    }

    /// Updates are admitted unless the only change is one the controller
    /// itself produced or one that cannot affect the reconcile outcome:
    ///
    /// - finalizer addition from none to one
    /// - the operator `action` being cleared (one-shot consumption; clearing
    ///   must not look like a fresh operator command)
    /// - first-time metric definition population
    /// - status-only writes
    ///
    /// Generation changes (spec edits) always admit, as does a freshly set
    /// deletion timestamp.
    pub fn admit_update(&self, old: &Experiment, new: &Experiment) -> bool {
        if new.metadata.generation != old.metadata.generation {
            return true;
        }
        if old.metadata.deletion_timestamp.is_none() && new.metadata.deletion_timestamp.is_some() {
            return true;
        }

        let spec_equal = old.spec == new.spec;
        let metrics_equal = old.metrics == new.metrics;
        let finalizers_equal = old.metadata.finalizers == new.metadata.finalizers;

        // Finalizer-only addition from none to one.
        if spec_equal
            && metrics_equal
            && !finalizers_equal
            && old.metadata.finalizers.is_empty()
            && new.metadata.finalizers.len() == 1
        {
            return false;
        }

        // Controller consumed the one-shot action.
        if metrics_equal
            && finalizers_equal
            && old.spec.action.is_some()
            && new.spec.action.is_none()
            && spec_equal_modulo_action(&old.spec, &new.spec)
        {
            return false;
        }

        // First-time metrics list population.
        if spec_equal
            && finalizers_equal
            && !metrics_equal
            && old.metrics.is_empty()
            && !new.metrics.is_empty()
        {
            return false;
        }

        // Status-only write.
        if spec_equal && metrics_equal && finalizers_equal {
            return false;
        }

        true
    }
}

fn spec_equal_modulo_action(
    old: &crate::domain::models::ExperimentSpec,
    new: &crate::domain::models::ExperimentSpec,
) -> bool {
    let mut old = old.clone();
    let mut new = new.clone();
    old.action = None;
    new.action = None;
    old == new
}
