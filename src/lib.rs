//! # statewatch - declarative state-change subscriptions
//!
//! statewatch sits between a continuously mutating key/value state store (a
//! home/building automation object bus) and the scripts that react to it.
//! Scripts register declarative filters; the engine evaluates every incoming
//! state change against all of them and runs only the matching handlers,
//! without blocking the producer and without letting one slow or failing
//! handler stall the others.
//!
//! ## Core Concepts
//!
//! - **FilterSpec**: the JSON-compatible filter (`id`, `val`, `oldValGt`, `enumId`, ...)
//! - **CompiledPredicate**: a filter compiled into typed per-field matchers
//! - **SubscriptionRegistry**: live filters bound to handlers
//! - **Dispatcher**: bounded intake, ordered dispatch passes, a handler worker pool
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//! use statewatch::{EngineConfig, FilterSpec, StateChangeEvent, StateSnapshot, WatchEngine};
//!
//! let engine = WatchEngine::new(EngineConfig::default());
//!
//! let filter = FilterSpec::from_json(serde_json::json!({
//!     "id": "/^hm-rpc\\.0\\..*\\.TEMPERATURE$/",
//!     "valGt": 25,
//!     "ack": true
//! }))?;
//!
//! engine.subscribe(filter, |event, _ctx| {
//!     println!("{} is now {}", event.id, event.new_state.value);
//!     Ok(())
//! });
//!
//! engine.publish(StateChangeEvent::new(
//!     "hm-rpc.0.LEQ01.1.TEMPERATURE",
//!     StateSnapshot::new(24.0).with_ack(true),
//!     StateSnapshot::new(26.5).with_ack(true),
//! ));
//! engine.wait_idle(Duration::from_secs(1));
//! # Ok::<(), statewatch::WatchError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod error;
pub mod event;
pub mod filter;
pub mod value;

// Compilation
pub mod matcher;

// Registry and dispatch
pub mod config;
pub mod engine;
pub mod logging;
pub mod monitor;

// Re-export primary types at crate root for convenience
pub use config::EngineConfig;
pub use engine::WatchEngine;
pub use error::{ExecutionError, HandlerError, HandlerResult, ValidationError, WatchError, WatchResult};
pub use event::{LocalizedText, Membership, StateChangeEvent, StateSnapshot};
pub use filter::{AckFlag, ChangeKind, FilterSpec, Logic, QualityPattern, RegexLiteral, TextPattern};
pub use logging::Logger;
pub use matcher::{compile, CompiledPredicate, Field, FieldCategory, FieldMatcher, MatcherRegistry};
pub use monitor::{
    DeliveryContext, DispatchReport, DispatchStats, Dispatcher, MatchStream, SubscribeOptions, SubscriptionId,
    SubscriptionInfo, SubscriptionRegistry,
};
pub use value::{CompareOp, StateValue};
