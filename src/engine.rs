//! The embeddable engine: a subscription registry wired to a dispatcher.

use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{HandlerResult, WatchResult};
use crate::event::StateChangeEvent;
use crate::filter::FilterSpec;
use crate::logging::Logger;
use crate::monitor::{
    DeliveryContext, DispatchReport, DispatchStats, Dispatcher, MatchStream, SubscribeOptions, SubscriptionId,
    SubscriptionInfo, SubscriptionRegistry,
};

/// Filter registry plus dispatcher, owned by a scripting runtime.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use statewatch::{EngineConfig, FilterSpec, StateChangeEvent, StateSnapshot, WatchEngine};
///
/// let engine = WatchEngine::new(EngineConfig::default());
/// let stream = engine.subscribe_stream(FilterSpec::for_state("hm.0.light"));
///
/// engine.publish(StateChangeEvent::new("hm.0.light", StateSnapshot::new(false), StateSnapshot::new(true)));
///
/// let event = stream.recv_timeout(Duration::from_secs(5)).unwrap();
/// assert_eq!(event.id, "hm.0.light");
/// ```
#[derive(Debug)]
pub struct WatchEngine {
    config: EngineConfig,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Dispatcher,
    logger: Logger,
}

impl WatchEngine {
    /// Creates an engine that logs through the caller's current dispatcher.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_logger(config, Logger::current())
    }

    /// Creates an engine that logs through `logger`.
    #[must_use]
    pub fn with_logger(config: EngineConfig, logger: Logger) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(config.mailbox_capacity));
        let dispatcher = Dispatcher::new(&config, Arc::clone(&registry), logger.clone());
        Self {
            config,
            registry,
            dispatcher,
            logger,
        }
    }

    /// Registers `handler` for events matching `pattern`.
    pub fn subscribe<F>(&self, pattern: FilterSpec, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with(pattern, SubscribeOptions::default(), handler)
    }

    /// Registers a filter given in its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the filter is malformed.
    pub fn subscribe_json<F>(&self, pattern: serde_json::Value, handler: F) -> WatchResult<SubscriptionId>
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        let pattern = FilterSpec::from_json(pattern)?;
        Ok(self.subscribe(pattern, handler))
    }

    /// Registers a subscription labelled with its owner (script name).
    pub fn subscribe_owned<F>(&self, owner: impl Into<String>, pattern: FilterSpec, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with(pattern, SubscribeOptions::owned_by(owner), handler)
    }

    /// Registers a subscription that removes itself after its first delivery.
    pub fn once<F>(&self, pattern: FilterSpec, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.subscribe_with(pattern, SubscribeOptions::default().once(), handler)
    }

    /// Registers a subscription with explicit options.
    pub fn subscribe_with<F>(&self, pattern: FilterSpec, options: SubscribeOptions, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChangeEvent, &DeliveryContext<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.logger
            .scope(|| self.registry.subscribe_with(pattern, options, handler))
    }

    /// Registers a channel-backed subscription buffering up to the mailbox
    /// capacity. Dropping the stream unsubscribes it.
    #[must_use]
    pub fn subscribe_stream(&self, pattern: FilterSpec) -> MatchStream {
        self.logger.scope(|| {
            MatchStream::open(
                &self.registry,
                pattern,
                SubscribeOptions::default(),
                self.config.mailbox_capacity,
            )
        })
    }

    /// Removes one subscription. Unknown ids return `false`.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.logger.scope(|| self.registry.unsubscribe(id))
    }

    /// Removes every subscription whose filter satisfies `pred`.
    pub fn unsubscribe_matching<P>(&self, pred: P) -> usize
    where
        P: FnMut(&FilterSpec) -> bool,
    {
        self.logger.scope(|| self.registry.unsubscribe_matching(pred))
    }

    /// Removes every subscription registered by `owner`.
    pub fn unsubscribe_owner(&self, owner: &str) -> usize {
        self.logger.scope(|| self.registry.unsubscribe_owner(owner))
    }

    /// Removes every subscription whose `id` filter names `state_id`,
    /// either literally or as the regex's `/source/flags` notation.
    pub fn unsubscribe_state(&self, state_id: &str) -> usize {
        self.logger.scope(|| self.registry.unsubscribe_state(state_id))
    }

    /// Removes every subscription.
    pub fn unsubscribe_all(&self) -> usize {
        self.logger.scope(|| self.registry.unsubscribe_all())
    }

    /// Point-in-time listing of live subscriptions, in id order.
    #[must_use]
    pub fn list(&self) -> Vec<SubscriptionInfo> {
        self.registry.list()
    }

    /// Returns true while `id` is registered.
    #[must_use]
    pub fn contains(&self, id: SubscriptionId) -> bool {
        self.registry.contains(id)
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns true when no subscription is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Non-blocking enqueue; see [`Dispatcher::publish`].
    pub fn publish(&self, event: StateChangeEvent) {
        self.dispatcher.publish(event);
    }

    /// Non-blocking enqueue that reports rejection.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::try_publish`].
    pub fn try_publish(&self, event: StateChangeEvent) -> WatchResult<()> {
        self.dispatcher.try_publish(event)
    }

    /// Runs one dispatch pass on the calling thread.
    pub fn dispatch(&self, event: &StateChangeEvent) -> DispatchReport {
        self.dispatcher.dispatch(event)
    }

    /// Waits for queued events and deliveries to drain.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Snapshot of the dispatch counters.
    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// The underlying registry, shareable with handlers.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Logger shared by the engine and its worker threads.
    #[must_use]
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }
}

impl Default for WatchEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
