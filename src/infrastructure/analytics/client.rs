//! HTTP client for the check-and-increment analytics service.
//!
//! JSON over HTTP POST to `/api/v1/analytics/canary/check_and_increment`.
//! The client is stateless; all session continuity lives in the request's
//! `lastState` blob. Retries are the caller's concern: the state machine
//! treats any error as "defer to the next interval".

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;

use crate::domain::errors::AnalyticsError;
use crate::domain::models::AnalyticsConfig;
use crate::domain::ports::AnalyticsService;

use super::types::{AnalyticsRequest, AnalyticsResponse};

/// Wire path of the check-and-increment operation. Shared with existing
/// analytics deployments; never derived.
const CHECK_AND_INCREMENT_PATH: &str = "/api/v1/analytics/canary/check_and_increment";

/// Reqwest-backed analytics client with connection pooling.
pub struct HttpAnalyticsClient {
    http_client: ReqwestClient,
    timeout_secs: u64,
}

impl HttpAnalyticsClient {
    pub fn new(config: &AnalyticsConfig) -> Result<Self> {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .context("Failed to build analytics HTTP client")?;

        Ok(Self {
            http_client,
            timeout_secs: config.timeout_secs,
        })
    }

    fn route(endpoint: &str) -> String {
        format!(
            "{}{CHECK_AND_INCREMENT_PATH}",
            endpoint.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AnalyticsService for HttpAnalyticsClient {
    async fn invoke(
        &self,
        endpoint: &str,
        request: &AnalyticsRequest,
    ) -> Result<AnalyticsResponse, AnalyticsError> {
        let url = Self::route(endpoint);
        let response = self
            .http_client
            .post(&url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AnalyticsError::Timeout(self.timeout_secs)
                } else {
                    AnalyticsError::Unreachable(err.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error response".to_string());
            return Err(AnalyticsError::Api {
                status: status.as_u16(),
                message,
            });
        }

        // A malformed body on a success status is a protocol error; the
        // state machine retries it on the next interval.
        response
            .json::<AnalyticsResponse>()
            .await
            .map_err(|err| AnalyticsError::Protocol(err.to_string()))
    }
}
