//! Analytics service integration: wire types and the HTTP client.

pub mod client;
pub mod types;

pub use client::HttpAnalyticsClient;
pub use types::{AnalyticsRequest, AnalyticsResponse, WireTrafficSplit, WorkloadDescriptor};
