//! Channel-backed subscriber handle.
//!
//! A [`MatchStream`] registers a subscription whose handler forwards matching
//! events into a bounded channel the caller drains at its own pace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError, TrySendError};

use crate::error::{ExecutionError, WatchResult};
use crate::event::StateChangeEvent;
use crate::filter::FilterSpec;

use super::registry::{SubscribeOptions, SubscriptionRegistry};
use super::subscription::SubscriptionId;

const STREAM_PATH: &str = "match_stream";

/// A channel-backed subscription.
///
/// Matching events are buffered in a bounded channel instead of being handed
/// to a callback. Dropping the stream unsubscribes it.
#[derive(Debug)]
pub struct MatchStream {
    subscription_id: SubscriptionId,
    rx: Receiver<Arc<StateChangeEvent>>,
    registry: Arc<SubscriptionRegistry>,
    unregistered: AtomicBool,
}

impl MatchStream {
    pub(crate) fn open(
        registry: &Arc<SubscriptionRegistry>,
        pattern: FilterSpec,
        options: SubscribeOptions,
        capacity: usize,
    ) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded::<Arc<StateChangeEvent>>(capacity);

        let subscription_id = registry.subscribe_with(pattern, options, move |event, ctx| {
            match tx.try_send(Arc::new(event.clone())) {
                Ok(()) => Ok(()),
                Err(TrySendError::Full(_)) => Err(ExecutionError::QueueFull {
                    path: STREAM_PATH.to_string(),
                    capacity,
                }
                .into()),
                Err(TrySendError::Disconnected(_)) => {
                    // Receiver gone without Drop having run (leaked stream).
                    ctx.unsubscribe();
                    Ok(())
                }
            }
        });

        Self {
            subscription_id,
            rx,
            registry: Arc::clone(registry),
            unregistered: AtomicBool::new(false),
        }
    }

    /// The subscription id backing this stream.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription_id
    }

    /// Unsubscribes explicitly. Buffered events can still be received.
    ///
    /// Returns true on the first call if the subscription was still registered.
    pub fn unsubscribe(&self) -> bool {
        if self.unregistered.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.registry.unsubscribe(self.subscription_id)
    }

    /// Try to receive the next event without blocking.
    ///
    /// Returns `Ok(None)` when nothing is buffered.
    pub fn try_recv(&self) -> WatchResult<Option<Arc<StateChangeEvent>>> {
        match self.rx.try_recv() {
            Ok(ev) => Ok(Some(ev)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(disconnected()),
        }
    }

    /// Receive the next event, blocking.
    pub fn recv(&self) -> WatchResult<Arc<StateChangeEvent>> {
        self.rx.recv().map_err(|_| disconnected())
    }

    /// Receive the next event with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> WatchResult<Arc<StateChangeEvent>> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => ExecutionError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into(),
            RecvTimeoutError::Disconnected => disconnected(),
        })
    }
}

fn disconnected() -> crate::error::WatchError {
    ExecutionError::Disconnected {
        path: STREAM_PATH.to_string(),
    }
    .into()
}

impl Drop for MatchStream {
    fn drop(&mut self) {
        if !self.unregistered.swap(true, Ordering::AcqRel) {
            self.registry.unsubscribe(self.subscription_id);
        }
    }
}
