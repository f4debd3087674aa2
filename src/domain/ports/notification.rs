//! Notification port - publishes experiment lifecycle events.
//!
//! Delivery is best-effort: publish failures are logged by the caller and
//! never block a state transition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::NotificationError;
use crate::domain::models::{ExperimentId, StableTarget};

/// What happened to the experiment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecyclePayload {
    /// The controller took ownership of a new record.
    ExperimentCreated,
    /// One analytics iteration was applied.
    IterationCompleted { iteration: u32, summary: String },
    /// The experiment reached its terminal state.
    ExperimentCompleted {
        succeeded: bool,
        stable: StableTarget,
    },
    /// The experiment was ended abnormally (operator abort or deletion).
    ExperimentAborted { reason: String },
}

/// Envelope published to the configured channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub experiment: ExperimentId,
    pub payload: LifecyclePayload,
}

impl LifecycleEvent {
    pub fn new(experiment: ExperimentId, payload: LifecyclePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            experiment,
            payload,
        }
    }
}

/// Sink for lifecycle events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish(&self, event: LifecycleEvent) -> Result<(), NotificationError>;
}

/// Sink that discards every event. Used when no notification sidecar is
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn publish(&self, _event: LifecycleEvent) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_sink_accepts_everything() {
        let sink = NullNotificationSink;
        let event = LifecycleEvent::new(
            ExperimentId::new("reviews-rollout", "bookinfo"),
            LifecyclePayload::ExperimentCreated,
        );
        assert!(sink.publish(event).await.is_ok());
    }

    #[test]
    fn test_event_serialization_tags_payload() {
        let event = LifecycleEvent::new(
            ExperimentId::new("reviews-rollout", "bookinfo"),
            LifecyclePayload::ExperimentCompleted {
                succeeded: true,
                stable: StableTarget::Candidate,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["type"], "experiment_completed");
        assert_eq!(json["payload"]["stable"], "candidate");
    }
}
