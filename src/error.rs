//! Error types for statewatch.
//!
//! All errors are strongly typed using thiserror. Matcher and handler failures
//! never surface through these types to the event producer; they are logged and
//! counted at the dispatcher boundary instead.

use thiserror::Error;

use crate::monitor::SubscriptionId;

/// Validation errors raised while building filters or configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid filter: {reason}")]
    InvalidFilter {
        reason: String,
    },

    #[error("Invalid regular expression '{pattern}': {reason}")]
    InvalidRegex {
        pattern: String,
        reason: String,
    },

    #[error("Unsupported regular expression flag '{flag}'")]
    UnsupportedRegexFlag {
        flag: char,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// Execution errors raised by the dispatcher and subscriber handles.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Queue '{path}' is full (capacity {capacity})")]
    QueueFull {
        path: String,
        capacity: usize,
    },

    #[error("Channel '{path}' is disconnected")]
    Disconnected {
        path: String,
    },

    #[error("Operation timed out after {duration_ms}ms")]
    Timeout {
        duration_ms: u64,
    },

    #[error("Handler for subscription {subscription_id} failed: {message}")]
    HandlerFailed {
        subscription_id: SubscriptionId,
        message: String,
    },

    #[error("Handler for subscription {subscription_id} panicked: {message}")]
    HandlerPanicked {
        subscription_id: SubscriptionId,
        message: String,
    },
}

/// Top-level error type for statewatch.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
    },
}

impl WatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an execution error.
    #[must_use]
    pub const fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// Only a full intake queue or a timed-out wait qualifies; everything else is
    /// deterministic.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Internal { .. } => false,
            Self::Execution(e) => matches!(
                e,
                ExecutionError::QueueFull { .. } | ExecutionError::Timeout { .. }
            ),
        }
    }
}

/// Result type alias for statewatch operations.
pub type WatchResult<T> = Result<T, WatchError>;

/// Error returned by a subscription handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result returned by a subscription handler.
pub type HandlerResult = Result<(), HandlerError>;
