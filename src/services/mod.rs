//! Services layer: the reconcile core.

pub mod dispatcher;
pub mod event_filter;
pub mod index_cache;
pub mod state_machine;
pub mod target_resolver;

pub use dispatcher::{ReconcileDispatcher, ReconcileQueue};
pub use event_filter::{ExperimentEventFilter, WorkloadEventFilter};
pub use index_cache::IndexCache;
pub use state_machine::{ExperimentStateMachine, ReconcileOutcome, ShutdownSignal};
pub use target_resolver::TargetResolver;
