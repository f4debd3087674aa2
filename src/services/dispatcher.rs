//! Reconcile dispatcher: work queue plus worker pool.
//!
//! Experiment keys flow in from event filters and requeue timers; a bounded
//! pool of workers drains them through the state machine. The queue keeps
//! three sets - queued, processing, dirty - so that pending wake-ups for one
//! experiment coalesce into a single reconcile and at most one reconcile per
//! experiment-id is in flight at any instant. Ordering is preserved per key;
//! nothing is guaranteed across keys.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::future::join_all;
use tokio::sync::{watch, Notify};
use tracing::{debug, info_span, warn, Instrument};

use crate::domain::errors::ReconcileError;
use crate::domain::models::{BackoffConfig, ExperimentId};
use crate::domain::ports::ClusterClient;
use crate::services::state_machine::{ExperimentStateMachine, ReconcileOutcome, ShutdownSignal};
use crate::services::IndexCache;

#[derive(Debug, Default)]
struct QueueState {
    order: VecDeque<ExperimentId>,
    queued: HashSet<ExperimentId>,
    processing: HashSet<ExperimentId>,
    dirty: HashSet<ExperimentId>,
}

/// Coalescing work queue with per-key mutual exclusion.
pub struct ReconcileQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    shutdown: ShutdownSignal,
}

impl ReconcileQueue {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            shutdown,
        }
    }

    /// Enqueue a key. Keys already queued coalesce; keys currently being
    /// processed are marked dirty and re-enqueued when processing finishes.
    pub fn add(&self, id: ExperimentId) {
        let mut state = self.lock();
        if state.processing.contains(&id) {
            state.dirty.insert(id);
            return;
        }
        if state.queued.insert(id.clone()) {
            state.order.push_back(id);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Enqueue a key after a delay. This is the requeue-after-duration
    /// mechanism; no reconcile ever sleeps inline.
    pub fn add_after(self: &Arc<Self>, id: ExperimentId, delay: StdDuration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !*queue.shutdown.borrow() {
                queue.add(id);
            }
        });
    }

    /// Wait for the next key, marking it processing. Returns `None` on
    /// shutdown.
    pub async fn get(&self) -> Option<ExperimentId> {
        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if let Some(id) = self.try_pop() {
                return Some(id);
            }
            tokio::select! {
                () = self.notify.notified() => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Mark a key done. A dirty key goes straight back into the queue.
    pub fn done(&self, id: &ExperimentId) {
        let mut state = self.lock();
        state.processing.remove(id);
        if state.dirty.remove(id) && state.queued.insert(id.clone()) {
            state.order.push_back(id.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Number of keys waiting (excluding the ones being processed).
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().order.is_empty()
    }

    fn try_pop(&self) -> Option<ExperimentId> {
        let mut state = self.lock();
        let id = state.order.pop_front()?;
        state.queued.remove(&id);
        state.processing.insert(id.clone());
        Some(id)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Drains the work queue through the state machine on a bounded worker pool.
pub struct ReconcileDispatcher {
    queue: Arc<ReconcileQueue>,
    machine: Arc<ExperimentStateMachine>,
    cluster: Arc<dyn ClusterClient>,
    cache: Arc<IndexCache>,
    workers: usize,
    backoff_config: BackoffConfig,
    backoffs: Mutex<HashMap<ExperimentId, ExponentialBackoff>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: ShutdownSignal,
}

impl ReconcileDispatcher {
    pub fn new(
        machine: Arc<ExperimentStateMachine>,
        cluster: Arc<dyn ClusterClient>,
        cache: Arc<IndexCache>,
        workers: usize,
        backoff_config: BackoffConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            queue: Arc::new(ReconcileQueue::new(shutdown_rx.clone())),
            machine,
            cluster,
            cache,
            workers: workers.max(1),
            backoff_config,
            backoffs: Mutex::new(HashMap::new()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Enqueue an experiment for reconciliation.
    pub fn enqueue(&self, id: ExperimentId) {
        self.queue.add(id);
    }

    /// Enqueue an experiment after a delay.
    pub fn enqueue_after(&self, id: ExperimentId, delay: StdDuration) {
        self.queue.add_after(id, delay);
    }

    /// Signal shutdown: workers finish their in-flight reconcile and stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Run the worker pool until shutdown.
    pub async fn run(self: Arc<Self>) {
        let workers: Vec<_> = (0..self.workers)
            .map(|worker| {
                let dispatcher = Arc::clone(&self);
                tokio::spawn(async move {
                    debug!(worker, "reconcile worker started");
                    dispatcher.worker_loop().await;
                    debug!(worker, "reconcile worker stopped");
                })
            })
            .collect();
        join_all(workers).await;
    }

    async fn worker_loop(&self) {
        while let Some(id) = self.queue.get().await {
            self.process(&id).await;
            self.queue.done(&id);
        }
    }

    /// Fetch, register, reconcile, and schedule follow-up work for one key.
    async fn process(&self, id: &ExperimentId) {
        let span = info_span!("reconcile", namespace = %id.namespace, name = %id.name);
        async {
            match self.cluster.get_experiment(id).await {
                Ok(None) => {
                    debug!("experiment not found, dropping work item");
                    self.clear_backoff(id);
                }
                Ok(Some(experiment)) => {
                    self.cache.register_experiment(&experiment);
                    match self.machine.reconcile(experiment, &self.shutdown_rx).await {
                        Ok(ReconcileOutcome::Done) => self.clear_backoff(id),
                        Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                            self.clear_backoff(id);
                            self.queue.add_after(id.clone(), delay);
                        }
                        Err(ReconcileError::Canceled) => {
                            debug!("reconcile canceled by shutdown");
                        }
                        Err(ReconcileError::Transient(msg)) => {
                            let delay = self.next_backoff(id);
                            warn!(
                                error = %msg,
                                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                                "transient reconcile failure, backing off"
                            );
                            self.queue.add_after(id.clone(), delay);
                        }
                    }
                }
                Err(err) if err.is_transient() => {
                    let delay = self.next_backoff(id);
                    warn!(error = %err, "transient fetch failure, backing off");
                    self.queue.add_after(id.clone(), delay);
                }
                Err(err) => {
                    warn!(error = %err, "unrecoverable fetch failure, dropping work item");
                    self.clear_backoff(id);
                }
            }
        }
        .instrument(span)
        .await;
    }

    fn next_backoff(&self, id: &ExperimentId) -> StdDuration {
        let mut backoffs = self.lock_backoffs();
        let backoff = backoffs
            .entry(id.clone())
            .or_insert_with(|| self.fresh_backoff());
        backoff
            .next_backoff()
            .unwrap_or(StdDuration::from_millis(self.backoff_config.max_backoff_ms))
    }

    fn clear_backoff(&self, id: &ExperimentId) {
        self.lock_backoffs().remove(id);
    }

    fn fresh_backoff(&self) -> ExponentialBackoff {
        let initial = StdDuration::from_millis(self.backoff_config.initial_backoff_ms);
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: StdDuration::from_millis(self.backoff_config.max_backoff_ms),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        }
    }

    fn lock_backoffs(&self) -> std::sync::MutexGuard<'_, HashMap<ExperimentId, ExponentialBackoff>> {
        self.backoffs
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
