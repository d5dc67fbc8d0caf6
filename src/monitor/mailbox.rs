//! Per-subscription mailboxes and the handler worker pool.
//!
//! Each subscription owns a bounded FIFO mailbox plus a "scheduled" token.
//! The dispatcher pushes matched events into mailboxes; the first push into an
//! idle mailbox hands the subscription to the worker pool. A worker drains the
//! mailbox until it is empty and then releases the token, so at most one worker
//! runs a given subscription's handler at a time.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::error::ExecutionError;
use crate::event::StateChangeEvent;
use crate::logging::Logger;

use super::dispatcher::Counters;
use super::registry::SubscriptionRegistry;
use super::subscription::{DeliveryContext, Subscription};

/// Result of offering an event to a mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Queued; the subscription must be handed to a worker.
    Schedule,
    /// Queued behind a worker that is already draining.
    Queued,
    /// Mailbox at capacity; the event was not queued.
    Full,
}

pub(crate) struct Mailbox {
    queue: Mutex<VecDeque<Arc<StateChangeEvent>>>,
    scheduled: AtomicBool,
    capacity: usize,
}

impl Mailbox {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            scheduled: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<StateChangeEvent>>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn offer(&self, event: Arc<StateChangeEvent>) -> Offer {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            return Offer::Full;
        }
        queue.push_back(event);
        // Token flips under the queue lock so `next` cannot miss this push.
        if self.scheduled.swap(true, Ordering::AcqRel) {
            Offer::Queued
        } else {
            Offer::Schedule
        }
    }

    /// Pops the next event, releasing the token when the mailbox is empty.
    fn next(&self) -> Option<Arc<StateChangeEvent>> {
        let mut queue = self.lock();
        let event = queue.pop_front();
        if event.is_none() {
            self.scheduled.store(false, Ordering::Release);
        }
        event
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Pool of threads that drain scheduled mailboxes.
///
/// `workers` core threads live as long as the pool. When a subscription is
/// scheduled while every thread is inside a handler, an overflow thread is
/// spawned for it, so blocked handlers can never starve other subscriptions.
/// Overflow threads retire after [`OVERFLOW_IDLE`] without work.
///
/// Threads exit once the pool (the last job sender) is dropped and the job
/// queue is empty. Handles are detached on drop: a handler may outlive the
/// engine that scheduled it, and joining from a worker would deadlock.
pub(crate) struct WorkerPool {
    tx: Sender<Arc<Subscription>>,
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

/// How long an overflow worker waits for a job before exiting.
pub(crate) const OVERFLOW_IDLE: Duration = Duration::from_secs(1);

struct PoolShared {
    rx: Receiver<Arc<Subscription>>,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<Counters>,
    logger: Logger,
    /// Workers waiting for a job minus jobs already handed to them.
    idle: AtomicUsize,
    overflow_seq: AtomicUsize,
}

impl PoolShared {
    /// Claims one idle worker. False when every worker is busy.
    fn reserve(&self) -> bool {
        self.idle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl WorkerPool {
    pub(crate) fn start(
        workers: usize,
        registry: &Arc<SubscriptionRegistry>,
        counters: &Arc<Counters>,
        logger: &Logger,
    ) -> Self {
        let workers = workers.max(1);
        // Unbounded: at most one entry per subscription is ever in flight.
        let (tx, rx) = unbounded::<Arc<Subscription>>();
        let shared = Arc::new(PoolShared {
            rx,
            registry: Arc::clone(registry),
            counters: Arc::clone(counters),
            logger: logger.clone(),
            idle: AtomicUsize::new(workers),
            overflow_seq: AtomicUsize::new(0),
        });

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(format!("statewatch-handler-{idx}"))
                .spawn(move || {
                    shared.logger.scope(|| {
                        tracing::debug!(worker = idx, "handler worker started");
                        work(&shared, None, None);
                        tracing::debug!(worker = idx, "handler worker stopped");
                    });
                })
                .expect("failed to spawn statewatch handler worker");
            handles.push(handle);
        }

        Self {
            tx,
            shared,
            workers: handles,
        }
    }

    pub(crate) fn schedule(&self, sub: Arc<Subscription>) {
        if self.shared.reserve() {
            // Workers only exit after every sender is gone, so this cannot
            // fail while `self` is alive.
            let _ = self.tx.send(sub);
            return;
        }

        let seq = self.shared.overflow_seq.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let job = Arc::clone(&sub);
        let spawned = thread::Builder::new()
            .name(format!("statewatch-handler-overflow-{seq}"))
            .spawn(move || {
                shared
                    .logger
                    .scope(|| work(&shared, Some(job), Some(OVERFLOW_IDLE)));
            });

        match spawned {
            Ok(_) => {
                self.shared.counters.overflow_workers.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    subscription_id = %sub.id(),
                    core_workers = self.workers.len(),
                    "all handler workers busy; spawned overflow worker"
                );
            }
            Err(err) => {
                tracing::error!(
                    subscription_id = %sub.id(),
                    error = %err,
                    "failed to spawn overflow worker; delivery waits for a free worker"
                );
                let _ = self.tx.send(sub);
            }
        }
    }

    pub(crate) fn size(&self) -> usize {
        self.workers.len()
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("idle", &self.shared.idle.load(Ordering::Relaxed))
            .field("queued", &self.tx.len())
            .finish()
    }
}

/// Worker loop. Core workers pass `retire_after: None` and block until the
/// pool is dropped; overflow workers start with their first job and exit
/// once idle for `retire_after`.
fn work(shared: &PoolShared, first: Option<Arc<Subscription>>, retire_after: Option<Duration>) {
    let mut next = first;
    loop {
        if let Some(sub) = next.take() {
            drain(&sub, &shared.registry, &shared.counters);
            shared.idle.fetch_add(1, Ordering::AcqRel);
        }

        let job = match retire_after {
            Some(timeout) => shared.rx.recv_timeout(timeout),
            None => shared.rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match job {
            Ok(sub) => next = Some(sub),
            Err(RecvTimeoutError::Disconnected) => return,
            // Give up our idle slot unless a job was already handed to it.
            Err(RecvTimeoutError::Timeout) => {
                if shared.reserve() {
                    return;
                }
            }
        }
    }
}

fn drain(sub: &Subscription, registry: &SubscriptionRegistry, counters: &Counters) {
    while let Some(event) = sub.mailbox.next() {
        if sub.is_active() {
            deliver(sub, &event, registry, counters);
        } else {
            counters.skipped_inactive.fetch_add(1, Ordering::Relaxed);
        }
        counters.finish_one();
    }
}

fn deliver(sub: &Subscription, event: &StateChangeEvent, registry: &SubscriptionRegistry, counters: &Counters) {
    let ctx = DeliveryContext::new(sub, registry);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| sub.invoke(event, &ctx)));

    let failure = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(ExecutionError::HandlerFailed {
            subscription_id: sub.id(),
            message: err.to_string(),
        }),
        Err(payload) => Some(ExecutionError::HandlerPanicked {
            subscription_id: sub.id(),
            message: panic_message(payload.as_ref()),
        }),
    };

    counters.deliveries.fetch_add(1, Ordering::Relaxed);
    if let Some(err) = failure {
        counters.handler_failures.fetch_add(1, Ordering::Relaxed);
        tracing::error!(subscription_id = %sub.id(), state_id = %event.id, error = %err, "subscription handler failed");
    }

    if sub.is_once() {
        registry.unsubscribe(sub.id());
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
