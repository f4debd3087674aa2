//! Domain ports (interfaces) for the canaryd controller.

pub mod analytics;
pub mod cluster;
pub mod metric_store;
pub mod notification;
pub mod routing;

pub use analytics::AnalyticsService;
pub use cluster::ClusterClient;
pub use metric_store::{MetricStore, StaticMetricStore};
pub use notification::{LifecycleEvent, LifecyclePayload, NotificationSink, NullNotificationSink};
pub use routing::RoutingAdapter;
