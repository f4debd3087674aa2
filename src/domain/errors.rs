//! Domain error types for the canaryd controller.
//!
//! Each enum maps one external surface (cluster, routing dataplane, analytics
//! service, metric store) to a transient/permanent classification. The
//! reconcile loop turns permanent failures into conditions on the experiment
//! record and hands transient failures back to the dispatcher for backoff;
//! user-visible failure is always a condition, never a controller crash.

use thiserror::Error;

/// Errors from the cluster API client.
#[derive(Error, Debug, Clone)]
pub enum ClusterError {
    /// The object disappeared between observation and access.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Optimistic-concurrency token mismatch on a write.
    #[error("Write conflict on {0}: object was modified concurrently")]
    Conflict(String),

    /// Connection reset, timeout, throttling: retry with backoff.
    #[error("Transient cluster error: {0}")]
    Transient(String),

    /// The cluster rejected the request outright.
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// Conflicts are benign: the next event or timer re-enqueues the work.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Returns true if this error could succeed on retry.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::Transient(_))
    }
}

/// Errors from the traffic-routing dataplane adapter.
#[derive(Error, Debug, Clone)]
pub enum RoutingError {
    /// The dataplane write failed but may succeed on retry.
    #[error("Routing update failed (retryable): {0}")]
    Retryable(String),

    /// The dataplane rejected the rules; retrying cannot help.
    #[error("Routing update rejected: {0}")]
    Fatal(String),
}

impl RoutingError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }
}

/// Errors from the external analytics service.
///
/// Every variant is treated as "defer to the next interval": the condition
/// `AnalyticsServiceNormal` flips false, no state advances this tick, and the
/// natural requeue-after-interval retries. Malformed responses are classified
/// transient as well.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// The endpoint could not be reached.
    #[error("Analytics service unreachable: {0}")]
    Unreachable(String),

    /// The service answered with a non-success status.
    #[error("Analytics service error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body did not match the expected schema.
    #[error("Analytics protocol error: {0}")]
    Protocol(String),

    /// The request exceeded the configured timeout.
    #[error("Analytics request timed out after {0} seconds")]
    Timeout(u64),
}

impl AnalyticsError {
    /// Returns true if a later interval could succeed.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Protocol(_) | Self::Timeout(_) => true,
            Self::Api { status, .. } => *status >= 500 || *status == 429,
        }
    }
}

/// Errors from the external metric-definition store.
#[derive(Error, Debug, Clone)]
pub enum MetricStoreError {
    /// A success criterion references a metric the store does not define.
    #[error("Metric not defined: {0}")]
    Missing(String),

    /// The store could not be read.
    #[error("Metric store read failed: {0}")]
    ReadFailed(String),
}

/// Errors from the notification sink. Delivery is best-effort; these are
/// logged and never block a state transition.
#[derive(Error, Debug, Clone)]
pub enum NotificationError {
    #[error("Notification publish failed: {0}")]
    PublishFailed(String),
}

/// Errors a reconcile pass returns to the dispatcher.
///
/// Anything not expressible as a condition on the record surfaces here.
/// `Transient` triggers exponential-backoff requeue; `Canceled` drops the
/// work item without a status write.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Transient reconcile failure: {0}")]
    Transient(String),

    /// Controller shutdown interrupted the reconcile.
    #[error("Reconcile canceled by shutdown")]
    Canceled,
}

impl From<ClusterError> for ReconcileError {
    fn from(err: ClusterError) -> Self {
        Self::Transient(err.to_string())
    }
}

impl From<RoutingError> for ReconcileError {
    fn from(err: RoutingError) -> Self {
        Self::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_error_classification() {
        assert!(ClusterError::Conflict("exp".to_string()).is_conflict());
        assert!(ClusterError::Conflict("exp".to_string()).is_transient());
        assert!(ClusterError::Transient("reset".to_string()).is_transient());
        assert!(!ClusterError::NotFound("exp".to_string()).is_transient());
        assert!(!ClusterError::Api("forbidden".to_string()).is_transient());
    }

    #[test]
    fn test_analytics_error_classification() {
        assert!(AnalyticsError::Unreachable("refused".to_string()).is_transient());
        assert!(AnalyticsError::Protocol("bad json".to_string()).is_transient());
        assert!(AnalyticsError::Timeout(30).is_transient());
        assert!(AnalyticsError::Api {
            status: 503,
            message: "unavailable".to_string()
        }
        .is_transient());
        assert!(!AnalyticsError::Api {
            status: 400,
            message: "bad request".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_routing_error_classification() {
        assert!(RoutingError::Retryable("timeout".to_string()).is_retryable());
        assert!(!RoutingError::Fatal("invalid host".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = ClusterError::Conflict("bookinfo/reviews".to_string());
        assert_eq!(
            err.to_string(),
            "Write conflict on bookinfo/reviews: object was modified concurrently"
        );

        let err = AnalyticsError::Api {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.to_string(), "Analytics service error 503: unavailable");
    }
}
