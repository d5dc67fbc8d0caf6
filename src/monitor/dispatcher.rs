//! Event dispatcher.
//!
//! Producers enqueue events onto a bounded intake channel with non-blocking
//! `try_send`. A dedicated intake thread takes them in arrival order, snapshots
//! the registry, evaluates each predicate and pushes matches into the
//! subscriptions' mailboxes. Handlers run on the worker pool; the intake thread
//! never waits for them.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{ExecutionError, WatchResult};
use crate::event::StateChangeEvent;
use crate::logging::Logger;

use super::mailbox::{Offer, WorkerPool};
use super::registry::SubscriptionRegistry;
use super::subscription::SubscriptionId;

const INTAKE_PATH: &str = "intake";

/// Shared atomic counters.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) events_received: AtomicU64,
    pub(crate) events_dropped: AtomicU64,
    pub(crate) events_dispatched: AtomicU64,
    pub(crate) matches: AtomicU64,
    pub(crate) deliveries: AtomicU64,
    pub(crate) deliveries_dropped: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) skipped_inactive: AtomicU64,
    pub(crate) overflow_workers: AtomicU64,
    /// Events queued on intake plus deliveries queued or running.
    outstanding: AtomicUsize,
}

impl Counters {
    fn begin_one(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn finish_one(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            matches: self.matches.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            skipped_inactive: self.skipped_inactive.load(Ordering::Relaxed),
            overflow_workers: self.overflow_workers.load(Ordering::Relaxed),
            pending: self.outstanding(),
        }
    }
}

/// Point-in-time dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events accepted by `publish`/`try_publish`/`dispatch`.
    pub events_received: u64,
    /// Events rejected because the intake queue was full or closed.
    pub events_dropped: u64,
    /// Events that completed a dispatch pass.
    pub events_dispatched: u64,
    /// Predicate matches across all passes.
    pub matches: u64,
    /// Handler invocations, successful or not.
    pub deliveries: u64,
    /// Matches dropped because a mailbox was full.
    pub deliveries_dropped: u64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: u64,
    /// Queued deliveries skipped because the subscription was removed first.
    pub skipped_inactive: u64,
    /// Extra handler threads spawned because every worker was busy.
    pub overflow_workers: u64,
    /// Events and deliveries not yet completed.
    pub pending: usize,
}

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Subscriptions whose predicate was evaluated.
    pub evaluated: usize,
    /// Subscriptions whose predicate matched and whose mailbox accepted the event.
    pub delivered: Vec<SubscriptionId>,
    /// Subscriptions whose predicate matched but whose mailbox was full.
    pub dropped: Vec<SubscriptionId>,
}

impl DispatchReport {
    /// Number of matching subscriptions.
    #[must_use]
    pub fn matched(&self) -> usize {
        self.delivered.len() + self.dropped.len()
    }
}

struct Core {
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<Counters>,
    pool: WorkerPool,
}

impl Core {
    fn dispatch(&self, event: &StateChangeEvent) -> DispatchReport {
        let snapshot = self.registry.snapshot();
        let mut report = DispatchReport::default();
        let mut shared: Option<Arc<StateChangeEvent>> = None;

        for sub in snapshot {
            if !sub.is_active() {
                continue;
            }
            report.evaluated += 1;
            if !sub.predicate().matches(event) || !sub.claim() {
                continue;
            }
            self.counters.matches.fetch_add(1, Ordering::Relaxed);

            let ev = Arc::clone(shared.get_or_insert_with(|| Arc::new(event.clone())));
            self.counters.begin_one();
            match sub.mailbox.offer(ev) {
                Offer::Schedule => {
                    report.delivered.push(sub.id());
                    self.pool.schedule(sub);
                }
                Offer::Queued => report.delivered.push(sub.id()),
                Offer::Full => {
                    self.counters.finish_one();
                    self.counters.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        subscription_id = %sub.id(),
                        state_id = %event.id,
                        capacity = sub.mailbox.capacity(),
                        "subscription mailbox full; delivery dropped"
                    );
                    report.dropped.push(sub.id());
                }
            }
        }

        self.counters.events_dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(
            state_id = %event.id,
            evaluated = report.evaluated,
            matched = report.matched(),
            "dispatch pass complete"
        );
        report
    }
}

/// Event dispatcher: bounded intake, one intake thread, a handler pool.
pub struct Dispatcher {
    core: Arc<Core>,
    intake_tx: Sender<StateChangeEvent>,
    intake_capacity: usize,
    logger: Logger,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Starts the intake thread and the handler pool.
    #[must_use]
    pub fn new(cfg: &EngineConfig, registry: Arc<SubscriptionRegistry>, logger: Logger) -> Self {
        let intake_capacity = cfg.intake_queue_capacity.max(1);
        let counters = Arc::new(Counters::default());
        let pool = WorkerPool::start(cfg.handler_workers, &registry, &counters, &logger);
        let core = Arc::new(Core {
            registry,
            counters,
            pool,
        });

        let (intake_tx, intake_rx) = bounded::<StateChangeEvent>(intake_capacity);

        let thread_core = Arc::clone(&core);
        let thread_logger = logger.clone();
        let join = thread::Builder::new()
            .name("statewatch-intake".to_string())
            .spawn(move || thread_logger.scope(|| intake_loop(&thread_core, &intake_rx)))
            .expect("failed to spawn statewatch intake thread");

        logger.scope(|| {
            tracing::debug!(
                intake_capacity,
                handler_workers = core.pool.size(),
                mailbox_capacity = cfg.mailbox_capacity,
                "dispatcher started"
            );
        });

        Self {
            core,
            intake_tx,
            intake_capacity,
            logger,
            join: Mutex::new(Some(join)),
        }
    }

    /// Non-blocking enqueue. A full or closed intake queue drops the event.
    pub fn publish(&self, event: StateChangeEvent) {
        if let Err(err) = self.try_publish(event) {
            self.logger.scope(|| {
                tracing::warn!(error = %err, "state-change event dropped");
            });
        }
    }

    /// Non-blocking enqueue that reports rejection.
    ///
    /// # Errors
    ///
    /// `QueueFull` when the intake queue is at capacity, `Disconnected` when
    /// the intake thread is gone.
    pub fn try_publish(&self, event: StateChangeEvent) -> WatchResult<()> {
        let counters = &self.core.counters;
        counters.begin_one();
        match self.intake_tx.try_send(event) {
            Ok(()) => {
                counters.events_received.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                counters.finish_one();
                counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                Err(match err {
                    TrySendError::Full(_) => ExecutionError::QueueFull {
                        path: INTAKE_PATH.to_string(),
                        capacity: self.intake_capacity,
                    },
                    TrySendError::Disconnected(_) => ExecutionError::Disconnected {
                        path: INTAKE_PATH.to_string(),
                    },
                }
                .into())
            }
        }
    }

    /// Runs one dispatch pass on the caller's thread.
    ///
    /// Matching handlers are still invoked on the worker pool.
    pub fn dispatch(&self, event: &StateChangeEvent) -> DispatchReport {
        self.core.counters.events_received.fetch_add(1, Ordering::Relaxed);
        self.logger.scope(|| self.core.dispatch(event))
    }

    /// Waits until the intake queue and every mailbox are drained.
    ///
    /// Returns `false` on timeout. A timeout too large to represent (such as
    /// `Duration::MAX`) waits without a deadline. Calling this from inside a
    /// handler waits for that handler too and therefore never succeeds.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.core.counters.outstanding() == 0 {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.core.counters.snapshot()
    }

    /// Number of events waiting on the intake queue.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.intake_tx.len()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("intake_capacity", &self.intake_capacity)
            .field("queued", &self.intake_tx.len())
            .field("pool", &self.core.pool)
            .finish_non_exhaustive()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        // Close intake so the thread drains what is queued and exits.
        let (dummy_tx, _) = bounded::<StateChangeEvent>(1);
        drop(std::mem::replace(&mut self.intake_tx, dummy_tx));

        let handle = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            // The intake thread never runs handlers, so it cannot be waiting on us.
            let _ = handle.join();
        }
        // Workers are detached; they exit once `core` (the last job sender) drops.
    }
}

fn intake_loop(core: &Core, rx: &Receiver<StateChangeEvent>) {
    tracing::debug!("intake thread started");
    while let Ok(event) = rx.recv() {
        core.dispatch(&event);
        core.counters.finish_one();
    }
    tracing::debug!("intake thread stopped");
}
