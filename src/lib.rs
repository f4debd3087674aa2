//! Canaryd - Progressive-Delivery Experiment Controller
//!
//! The control core of a progressive-delivery orchestrator:
//! - Level-triggered reconciliation state machine for Experiment records
//! - Bidirectional target/experiment index cache with presence marks
//! - Interval-driven progression backed by an external analytics service
//! - Work queue dispatcher with coalescing and per-key backoff
//! - Event admission filters that suppress no-op wake-ups

pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::models::{Experiment, ExperimentId, TrafficSplit};
pub use services::{ExperimentStateMachine, IndexCache, ReconcileDispatcher};
