//! Cluster port - interface to the durable object store and its watch surface.
//!
//! The experiment record in the cluster is the only durable shared state.
//! Concurrent writes are arbitrated by the record's optimistic-concurrency
//! token; conflicts surface as [`ClusterError::Conflict`] and are treated as
//! benign by the reconcile loop.

use async_trait::async_trait;

use crate::domain::errors::ClusterError;
use crate::domain::models::{ApiFamily, Experiment, ExperimentId, ObjectKey, Observation};

/// Client for experiment records, workload descriptors, and front-end
/// services.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Fetch an experiment record. `None` when the record does not exist.
    async fn get_experiment(&self, id: &ExperimentId) -> Result<Option<Experiment>, ClusterError>;

    /// Write the record's metadata, spec, and metric definitions, guarded by
    /// the optimistic-concurrency token. Returns the stored record with its
    /// refreshed token.
    async fn update_experiment(&self, experiment: &Experiment) -> Result<Experiment, ClusterError>;

    /// Write the record's status subresource, guarded by the token. Returns
    /// the stored record with its refreshed token.
    async fn update_experiment_status(
        &self,
        experiment: &Experiment,
    ) -> Result<Experiment, ClusterError>;

    /// Observe a workload descriptor of the given API family. A missing
    /// object is an observation, not an error.
    async fn get_workload(
        &self,
        family: ApiFamily,
        key: &ObjectKey,
    ) -> Result<Observation, ClusterError>;

    /// Observe a front-end service descriptor.
    async fn get_service(&self, key: &ObjectKey) -> Result<Observation, ClusterError>;

    /// Delete a workload. Deleting an absent workload succeeds.
    async fn delete_workload(&self, family: ApiFamily, key: &ObjectKey)
        -> Result<(), ClusterError>;
}
