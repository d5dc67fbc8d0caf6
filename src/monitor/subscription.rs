//! Subscriptions, their ids and the context handed to handlers.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::HandlerResult;
use crate::event::StateChangeEvent;
use crate::filter::FilterSpec;
use crate::matcher::CompiledPredicate;

use super::mailbox::Mailbox;
use super::registry::SubscriptionRegistry;

/// Stable identifier for a subscription.
///
/// Ids increase monotonically per registry and are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) type Handler = dyn Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync;

/// A registered filter bound to a handler.
pub struct Subscription {
    id: SubscriptionId,
    owner: Option<String>,
    pattern: FilterSpec,
    predicate: CompiledPredicate,
    handler: Box<Handler>,
    once: bool,
    fired: AtomicBool,
    active: AtomicBool,
    pub(crate) mailbox: Mailbox,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        owner: Option<String>,
        pattern: FilterSpec,
        predicate: CompiledPredicate,
        handler: Box<Handler>,
        once: bool,
        mailbox_capacity: usize,
    ) -> Self {
        Self {
            id,
            owner,
            pattern,
            predicate,
            handler,
            once,
            fired: AtomicBool::new(false),
            active: AtomicBool::new(true),
            mailbox: Mailbox::new(mailbox_capacity),
        }
    }

    /// Registry-assigned identifier.
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Owner tag given at subscribe time, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    /// The filter as registered.
    #[must_use]
    pub const fn pattern(&self) -> &FilterSpec {
        &self.pattern
    }

    /// The filter compiled for evaluation.
    #[must_use]
    pub const fn predicate(&self) -> &CompiledPredicate {
        &self.predicate
    }

    /// Returns true if this subscription removes itself after one delivery.
    #[must_use]
    pub const fn is_once(&self) -> bool {
        self.once
    }

    /// Returns false once the subscription has been removed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Clears the active flag. Returns true if it was set.
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// Claims the single delivery of a one-shot subscription.
    ///
    /// Always true for ordinary subscriptions.
    pub(crate) fn claim(&self) -> bool {
        !self.once || !self.fired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn invoke(&self, event: &StateChangeEvent, ctx: &DeliveryContext<'_>) -> HandlerResult {
        (self.handler)(event, ctx)
    }

    pub(crate) fn info(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            id: self.id,
            owner: self.owner.clone(),
            pattern: self.pattern.clone(),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("owner", &self.owner)
            .field("predicate", &self.predicate)
            .field("once", &self.once)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

/// Point-in-time description of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    /// Registry-assigned identifier.
    pub id: SubscriptionId,
    /// Owner tag, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// The filter as registered.
    pub pattern: FilterSpec,
}

/// Passed to a handler alongside each delivered event.
pub struct DeliveryContext<'a> {
    subscription: &'a Subscription,
    registry: &'a SubscriptionRegistry,
}

impl<'a> DeliveryContext<'a> {
    pub(crate) const fn new(subscription: &'a Subscription, registry: &'a SubscriptionRegistry) -> Self {
        Self { subscription, registry }
    }

    /// Id of the subscription being delivered to.
    #[must_use]
    pub const fn subscription_id(&self) -> SubscriptionId {
        self.subscription.id
    }

    /// Owner label of the subscription, if any.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.subscription.owner()
    }

    /// Removes the subscription being delivered to.
    ///
    /// Events already queued for it are discarded.
    pub fn unsubscribe(&self) -> bool {
        self.registry.unsubscribe(self.subscription.id)
    }

    /// The registry the subscription lives in.
    #[must_use]
    pub const fn registry(&self) -> &SubscriptionRegistry {
        self.registry
    }
}

impl fmt::Debug for DeliveryContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryContext")
            .field("subscription_id", &self.subscription.id)
            .finish_non_exhaustive()
    }
}
