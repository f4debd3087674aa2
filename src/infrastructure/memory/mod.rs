//! In-memory adapter implementations.
//!
//! Fault-injectable backends for the cluster, routing, and analytics ports.
//! They power the `simulate` dev harness and the integration tests; real
//! deployments wire the production adapters instead.

pub mod analytics;
pub mod cluster;
pub mod routing;

pub use analytics::{response, ScriptedAnalytics};
pub use cluster::MemoryCluster;
pub use routing::MemoryRouting;
