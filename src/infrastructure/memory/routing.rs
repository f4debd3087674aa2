//! In-memory routing dataplane.
//!
//! Records the split installed per experiment and a full apply history so
//! tests can assert on every dataplane write.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::RoutingError;
use crate::domain::models::{Experiment, ExperimentId, TrafficSplit};
use crate::domain::ports::RoutingAdapter;

#[derive(Debug, Default)]
struct RoutingState {
    rules: HashMap<ExperimentId, TrafficSplit>,
    history: Vec<(ExperimentId, TrafficSplit)>,
    /// Next N writes fail retryably.
    retryable_failures: u32,
}

/// Routing adapter backed by process-local state.
#[derive(Debug, Default)]
pub struct MemoryRouting {
    state: Mutex<RoutingState>,
}

impl MemoryRouting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split currently installed for the experiment, for assertions.
    pub fn installed(&self, id: &ExperimentId) -> Option<TrafficSplit> {
        self.lock().rules.get(id).copied()
    }

    /// Every split write in order, including re-applies.
    pub fn history(&self) -> Vec<(ExperimentId, TrafficSplit)> {
        self.lock().history.clone()
    }

    /// Fail the next `count` writes with a retryable error.
    pub fn inject_retryable_failures(&self, count: u32) {
        self.lock().retryable_failures = count;
    }

    /// Overwrite the installed split without recording history. Used by
    /// tests to simulate a dataplane trailing the recorded status.
    pub fn force_split(&self, id: ExperimentId, split: TrafficSplit) {
        self.lock().rules.insert(id, split);
    }

    fn write(&self, id: ExperimentId, split: TrafficSplit) -> Result<(), RoutingError> {
        let mut state = self.lock();
        if state.retryable_failures > 0 {
            state.retryable_failures -= 1;
            return Err(RoutingError::Retryable(
                "dataplane temporarily unavailable".to_string(),
            ));
        }
        state.rules.insert(id.clone(), split);
        state.history.push((id, split));
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RoutingState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RoutingAdapter for MemoryRouting {
    async fn current_split(&self, id: &ExperimentId) -> Result<Option<TrafficSplit>, RoutingError> {
        Ok(self.lock().rules.get(id).copied())
    }

    async fn install(
        &self,
        experiment: &Experiment,
        split: TrafficSplit,
    ) -> Result<(), RoutingError> {
        self.write(experiment.id(), split)
    }

    async fn apply_split(
        &self,
        experiment: &Experiment,
        split: TrafficSplit,
    ) -> Result<(), RoutingError> {
        self.write(experiment.id(), split)
    }

    async fn teardown(&self, id: &ExperimentId) -> Result<(), RoutingError> {
        self.lock().rules.remove(id);
        Ok(())
    }
}
