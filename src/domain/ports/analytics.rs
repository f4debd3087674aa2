//! Analytics port - interface to the external check-and-increment service.
//!
//! The client is stateless; all session continuity lives in the request's
//! `lastState` blob. Timeouts and retries are the caller's concern: the state
//! machine treats any error as "defer to the next interval".

use async_trait::async_trait;

use crate::domain::errors::AnalyticsError;
use crate::infrastructure::analytics::types::{AnalyticsRequest, AnalyticsResponse};

/// Single-operation client to the analytics service.
#[async_trait]
pub trait AnalyticsService: Send + Sync {
    /// POST the request to the endpoint's check-and-increment route and
    /// return the parsed response.
    async fn invoke(
        &self,
        endpoint: &str,
        request: &AnalyticsRequest,
    ) -> Result<AnalyticsResponse, AnalyticsError>;
}
