//! Scripted analytics backend.
//!
//! Serves a prerecorded sequence of responses (or failures) so the full
//! progression loop can run without a live analytics deployment. Used by the
//! `simulate` harness and the integration tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::AnalyticsError;
use crate::domain::ports::AnalyticsService;
use crate::infrastructure::analytics::types::{
    AnalyticsRequest, AnalyticsResponse, WireTrafficSplit,
};

#[derive(Debug, Clone)]
enum ScriptStep {
    Respond(AnalyticsResponse),
    Fail(u16),
}

#[derive(Debug, Default)]
struct ScriptState {
    steps: VecDeque<ScriptStep>,
    requests: Vec<AnalyticsRequest>,
}

/// Analytics service that replays a prerecorded script.
#[derive(Debug, Default)]
pub struct ScriptedAnalytics {
    state: Mutex<ScriptState>,
}

impl ScriptedAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a response step.
    pub fn then_respond(self, response: AnalyticsResponse) -> Self {
        self.lock().steps.push_back(ScriptStep::Respond(response));
        self
    }

    /// Append a split response with the given verdict flags.
    pub fn then_split(self, baseline: u32, candidate: u32, success: bool, stop: bool) -> Self {
        self.then_respond(response(baseline, candidate, success, stop))
    }

    /// Append a server-error step.
    pub fn then_fail(self, status: u16) -> Self {
        self.lock().steps.push_back(ScriptStep::Fail(status));
        self
    }

    /// Number of invocations served so far.
    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<AnalyticsRequest> {
        self.lock().requests.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl AnalyticsService for ScriptedAnalytics {
    async fn invoke(
        &self,
        _endpoint: &str,
        request: &AnalyticsRequest,
    ) -> Result<AnalyticsResponse, AnalyticsError> {
        let mut state = self.lock();
        state.requests.push(request.clone());
        match state.steps.pop_front() {
            Some(ScriptStep::Respond(response)) => Ok(response),
            Some(ScriptStep::Fail(status)) => Err(AnalyticsError::Api {
                status,
                message: "scripted failure".to_string(),
            }),
            None => Err(AnalyticsError::Api {
                status: 503,
                message: "script exhausted".to_string(),
            }),
        }
    }
}

/// Build a plain analytics response for scripts and tests.
pub fn response(baseline: u32, candidate: u32, success: bool, stop: bool) -> AnalyticsResponse {
    AnalyticsResponse {
        new_traffic_split: WireTrafficSplit {
            baseline,
            candidate,
        },
        assessment: serde_json::json!({"summary": {"all_success": success}}),
        last_state: serde_json::json!({"iteration": candidate}),
        success,
        stop,
        message: format!("assessed split {baseline}/{candidate}"),
    }
}
