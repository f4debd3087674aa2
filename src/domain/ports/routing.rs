//! Routing port - interface to the traffic-routing dataplane adapter.
//!
//! The adapter owns the service-mesh virtual-service/destination-rule objects
//! for an experiment. The core never touches those objects directly; it only
//! installs, reads back, applies, and tears down splits through this port.

use async_trait::async_trait;

use crate::domain::errors::RoutingError;
use crate::domain::models::{Experiment, ExperimentId, TrafficSplit};

/// Dataplane writer for an experiment's traffic-routing rules.
#[async_trait]
pub trait RoutingAdapter: Send + Sync {
    /// Report the split currently installed for the experiment, or `None`
    /// when no rules exist yet.
    async fn current_split(&self, id: &ExperimentId) -> Result<Option<TrafficSplit>, RoutingError>;

    /// Create the routing rules for the experiment's front-end service with
    /// the given split.
    async fn install(&self, experiment: &Experiment, split: TrafficSplit)
        -> Result<(), RoutingError>;

    /// Update existing rules to the given split.
    async fn apply_split(
        &self,
        experiment: &Experiment,
        split: TrafficSplit,
    ) -> Result<(), RoutingError>;

    /// Remove all routing rules owned by the experiment. Tearing down absent
    /// rules succeeds.
    async fn teardown(&self, id: &ExperimentId) -> Result<(), RoutingError>;
}
