//! Subscription registry and event dispatch.
//!
//! Subscriptions live in a [`SubscriptionRegistry`]. The [`Dispatcher`] takes
//! state-change events from producers, evaluates every live predicate against
//! them and queues matches into per-subscription mailboxes drained by a fixed
//! worker pool. [`MatchStream`] is the channel-backed alternative to a callback.

/// Intake thread and dispatch passes.
pub mod dispatcher;
pub(crate) mod mailbox;
/// Subscription storage.
pub mod registry;
/// Subscriber stream handle.
pub mod stream;
/// Subscription and delivery types.
pub mod subscription;

pub use dispatcher::{DispatchReport, DispatchStats, Dispatcher};
pub use registry::{SubscribeOptions, SubscriptionRegistry};
pub use stream::MatchStream;
pub use subscription::{DeliveryContext, Subscription, SubscriptionId, SubscriptionInfo};
