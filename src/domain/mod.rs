//! Domain layer for the canaryd controller.
//!
//! This module contains the experiment record model, the error taxonomy, and
//! the ports through which the core talks to its external collaborators.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{
    AnalyticsError, ClusterError, MetricStoreError, NotificationError, ReconcileError,
    RoutingError,
};
