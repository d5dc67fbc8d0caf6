//! Live set of subscriptions.
//!
//! Readers take point-in-time snapshots; writers (including handlers running on
//! worker threads) insert and remove under a short write lock. The lock is never
//! held while a predicate or a handler runs.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::HandlerResult;
use crate::event::StateChangeEvent;
use crate::filter::FilterSpec;
use crate::matcher::compile;

use super::subscription::{DeliveryContext, Subscription, SubscriptionId, SubscriptionInfo};

/// Registration options for a subscription.
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// Owner label (typically the script name).
    pub owner: Option<String>,
    /// Remove the subscription after its first delivery.
    pub once: bool,
}

impl SubscribeOptions {
    /// Options for a subscription owned by `owner`.
    #[must_use]
    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            once: false,
        }
    }

    /// Marks the subscription as one-shot.
    #[must_use]
    pub const fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Registry of subscriptions keyed by id.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    subs: RwLock<BTreeMap<SubscriptionId, Arc<Subscription>>>,
    mailbox_capacity: usize,
}

impl SubscriptionRegistry {
    /// Creates an empty registry whose subscriptions buffer up to
    /// `mailbox_capacity` pending deliveries each.
    #[must_use]
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            subs: RwLock::new(BTreeMap::new()),
            mailbox_capacity: mailbox_capacity.max(1),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<SubscriptionId, Arc<Subscription>>> {
        self.subs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<SubscriptionId, Arc<Subscription>>> {
        self.subs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Compiles `pattern` and registers it with `handler`.
    pub fn subscribe<F>(&self, pattern: FilterSpec, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with(pattern, SubscribeOptions::default(), handler)
    }

    /// Registers a subscription with explicit options.
    pub fn subscribe_with<F>(&self, pattern: FilterSpec, options: SubscribeOptions, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let predicate = compile(&pattern);
        let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let sub = Subscription::new(
            id,
            options.owner,
            pattern,
            predicate,
            Box::new(handler),
            options.once,
            self.mailbox_capacity,
        );

        tracing::debug!(
            subscription_id = %id,
            owner = sub.owner().unwrap_or(""),
            fields = sub.predicate().fields().len(),
            once = sub.is_once(),
            "subscribed"
        );

        self.write().insert(id, Arc::new(sub));
        id
    }

    /// Removes one subscription. Unknown ids return `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.write().remove(&id);
        match removed {
            Some(sub) => {
                sub.deactivate();
                tracing::debug!(subscription_id = %id, "unsubscribed");
                true
            }
            None => false,
        }
    }

    /// Removes every subscription whose filter satisfies `pred`.
    ///
    /// `pred` runs under the write lock and must not call back into the
    /// registry.
    pub fn unsubscribe_matching<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&FilterSpec) -> bool,
    {
        self.remove_where(|sub| pred(sub.pattern()))
    }

    /// Removes every subscription registered by `owner`.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        self.remove_where(|sub| sub.owner() == Some(owner))
    }

    /// Removes every subscription whose `id` filter names `state_id`: a
    /// literal, a list containing it, or a regular expression written exactly
    /// as `state_id` (`/source/flags`).
    pub fn unsubscribe_state(&self, state_id: &str) -> usize {
        self.remove_where(|sub| sub.pattern().targets_state(state_id))
    }

    /// Removes every subscription.
    pub fn unsubscribe_all(&self) -> usize {
        self.remove_where(|_| true)
    }

    fn remove_where<P>(&self, mut pred: P) -> usize
    where
        P: FnMut(&Subscription) -> bool,
    {
        let removed: Vec<Arc<Subscription>> = {
            let mut subs = self.write();
            let ids: Vec<SubscriptionId> = subs
                .values()
                .filter(|sub| pred(sub))
                .map(|sub| sub.id())
                .collect();
            ids.iter().filter_map(|id| subs.remove(id)).collect()
        };

        for sub in &removed {
            sub.deactivate();
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "unsubscribed");
        }
        removed.len()
    }

    /// Stable copy of the live subscriptions, in id order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Subscription>> {
        self.read().values().cloned().collect()
    }

    /// Point-in-time listing of `(id, owner, pattern)`, in id order.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        self.read().values().map(|sub| sub.info()).collect()
    }

    /// Looks up a subscription.
    #[must_use]
    pub fn get(&self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        self.read().get(&id).cloned()
    }

    /// Returns true while `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.read().contains_key(&id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true when no subscription is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().mailbox_capacity)
    }
}
