//! Requeue-driven reconciliation loop.
//!
//! Keys come from a periodic resync of the store and from [`Enqueuer`]
//! handles. Each key is reconciled at most once at a time; the verdict of a
//! pass decides when it is reconciled again:
//!
//! - failure or `requeue`: again after an exponential backoff
//! - `requeue_after`: again after that delay, backoff reset
//! - otherwise: idle until the next resync or enqueue

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use rwo_workflow::ActionResult;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use crate::types::ObjectKey;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum keys reconciled at once.
    pub max_concurrent_reconciles: usize,
    /// Delay after the first failure.
    pub base_backoff: Duration,
    /// Upper bound of the backoff.
    pub max_backoff: Duration,
    /// Interval between full resyncs of the store.
    pub resync_interval: Duration,
    /// Consecutive failures after which a key is parked until the next
    /// resync. Zero never parks.
    pub max_consecutive_errors: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 64,
            base_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_secs(10),
            resync_interval: Duration::from_secs(600),
            max_consecutive_errors: 0,
        }
    }
}

impl LoopConfig {
    /// Backoff after the given number of consecutive failures:
    /// `base * 2^(failures - 1)`, capped at `max_backoff`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

enum Verdict {
    Backoff,
    After(Duration),
    Done,
}

fn verdict(result: &ActionResult) -> Verdict {
    if result.is_failure() {
        Verdict::Backoff
    } else if let Some(after) = result.requeue_after() {
        Verdict::After(after)
    } else if result.requeue {
        Verdict::Backoff
    } else {
        Verdict::Done
    }
}

/// Pending keys with their due time, plus per-key bookkeeping.
#[derive(Default)]
struct WorkQueue {
    pending: BTreeMap<ObjectKey, Instant>,
    in_flight: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    failures: HashMap<ObjectKey, u32>,
}

impl WorkQueue {
    /// Schedule `key` at `at`, keeping an earlier due time. A key in
    /// flight is run again as soon as it finishes.
    fn add(&mut self, key: ObjectKey, at: Instant) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
            return;
        }
        self.pending
            .entry(key)
            .and_modify(|due| *due = (*due).min(at))
            .or_insert(at);
    }

    fn next_due(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    fn pop_due(&mut self, now: Instant) -> Option<ObjectKey> {
        let key = self
            .pending
            .iter()
            .filter(|(_, due)| **due <= now)
            .min_by_key(|(_, due)| **due)
            .map(|(key, _)| key.clone())?;
        self.pending.remove(&key);
        self.in_flight.insert(key.clone());
        Some(key)
    }

    fn finish(&mut self, key: &ObjectKey, result: &ActionResult, config: &LoopConfig, now: Instant) {
        self.in_flight.remove(key);
        let dirty = self.dirty.remove(key);

        match verdict(result) {
            Verdict::Backoff => {
                let failures = self.failures.entry(key.clone()).or_insert(0);
                *failures = failures.saturating_add(1);
                let failures = *failures;

                if config.max_consecutive_errors > 0 && failures >= config.max_consecutive_errors {
                    error!(
                        object = %key,
                        failures,
                        "Max consecutive errors reached, parking until next resync"
                    );
                    self.failures.remove(key);
                } else {
                    let delay = config.backoff(failures);
                    warn!(
                        object = %key,
                        failures,
                        backoff_ms = delay.as_millis(),
                        error = ?result.error.as_ref().map(ToString::to_string),
                        "Requeue with backoff"
                    );
                    self.add(key.clone(), now + delay);
                }
            }
            Verdict::After(after) => {
                self.failures.remove(key);
                debug!(object = %key, after_ms = after.as_millis(), "Requeue after");
                self.add(key.clone(), now + after);
            }
            Verdict::Done => {
                self.failures.remove(key);
            }
        }

        if dirty {
            self.add(key.clone(), now);
        }
    }
}

type Outcome = (ObjectKey, std::result::Result<ActionResult, JoinError>);

/// Continuous reconciliation loop.
pub struct ReconciliationLoop {
    /// The controller.
    controller: Arc<dyn Controller>,
    /// Source of keys for resyncs.
    store: Arc<dyn ObjectStore>,
    /// Loop configuration.
    config: LoopConfig,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
    queue_rx: mpsc::UnboundedReceiver<ObjectKey>,
    queue_tx: mpsc::UnboundedSender<ObjectKey>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(
        controller: Arc<dyn Controller>,
        store: Arc<dyn ObjectStore>,
        config: LoopConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            store,
            config,
            stop_rx,
            stop_tx,
            queue_rx,
            queue_tx,
        }
    }

    /// Run the loop until stopped.
    ///
    /// Returns once every in-flight reconcile has finished.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            max_concurrent = self.config.max_concurrent_reconciles,
            resync_ms = self.config.resync_interval.as_millis(),
            "Starting reconciliation loop"
        );

        let mut queue = WorkQueue::default();
        let mut tasks: JoinSet<Outcome> = JoinSet::new();
        let mut resync =
            tokio::time::interval(self.config.resync_interval.max(Duration::from_millis(1)));
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let now = Instant::now();
            while tasks.len() < self.config.max_concurrent_reconciles {
                let Some(key) = queue.pop_due(now) else {
                    break;
                };
                self.spawn(&mut tasks, key);
            }
            let next_due = (tasks.len() < self.config.max_concurrent_reconciles)
                .then(|| queue.next_due())
                .flatten();

            tokio::select! {
                biased;
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
                Some(joined) = tasks.join_next() => {
                    self.finish(&mut queue, joined);
                }
                Some(key) = self.queue_rx.recv() => {
                    queue.add(key, Instant::now());
                }
                _ = resync.tick() => {
                    self.resync(&mut queue).await;
                }
                () = tokio::time::sleep_until(next_due.unwrap_or(now)), if next_due.is_some() => {}
            }
        }

        info!(in_flight = tasks.len(), "Stopping reconciliation loop");
        while let Some(joined) = tasks.join_next().await {
            self.finish(&mut queue, joined);
        }
        info!("Reconciliation loop stopped");
        Ok(())
    }

    fn spawn(&self, tasks: &mut JoinSet<Outcome>, key: ObjectKey) {
        let controller = self.controller.clone();
        tasks.spawn(async move {
            let target = key.clone();
            // A panicking reconcile must not lose its key.
            let outcome = tokio::spawn(async move { controller.reconcile(&target).await }).await;
            (key, outcome)
        });
    }

    fn finish(&self, queue: &mut WorkQueue, joined: std::result::Result<Outcome, JoinError>) {
        let (key, outcome) = match joined {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "Reconcile task aborted");
                return;
            }
        };
        let result = outcome.unwrap_or_else(|e| {
            error!(object = %key, error = %e, "Reconcile panicked");
            ActionResult::from_error(Error::reconcile_failed(e.to_string()))
        });
        queue.finish(&key, &result, &self.config, Instant::now());
    }

    async fn resync(&self, queue: &mut WorkQueue) {
        match self.store.keys().await {
            Ok(keys) => {
                debug!(keys = keys.len(), "Resync");
                let now = Instant::now();
                for key in keys {
                    queue.add(key, now);
                }
            }
            Err(e) => warn!(error = %e, "Resync failed"),
        }
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }

    /// Get a handle that schedules keys for an immediate reconcile.
    pub fn enqueuer(&self) -> Enqueuer {
        Enqueuer {
            queue_tx: self.queue_tx.clone(),
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

/// Handle to schedule keys on a reconciliation loop.
#[derive(Clone)]
pub struct Enqueuer {
    queue_tx: mpsc::UnboundedSender<ObjectKey>,
}

impl Enqueuer {
    /// Schedule `key` for an immediate reconcile.
    pub fn enqueue(&self, key: ObjectKey) -> Result<()> {
        self.queue_tx.send(key).map_err(|_| Error::LoopStopped)
    }

    /// Enqueue every key received from `changes` until either side closes.
    pub fn watch(self, mut changes: broadcast::Receiver<ObjectKey>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(key) => {
                        if self.enqueue(key).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Change feed lagged, keys will be picked up on resync");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Change feed closed");
        })
    }
}
