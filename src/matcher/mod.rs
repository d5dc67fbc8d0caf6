//! Filter compilation.
//!
//! A [`FilterSpec`] compiles into a [`CompiledPredicate`]: one typed
//! [`FieldMatcher`] per present field, combined by the filter's logic.
//! Compilation is synchronous and performs no I/O; the result is immutable and
//! cheap to clone.

/// Per-category matcher implementations.
pub mod fields;
/// Field enumeration and the field → compiler table.
pub mod registry;

use std::fmt;
use std::sync::Arc;

use crate::event::StateChangeEvent;
use crate::filter::{FilterSpec, Logic};

pub use registry::{compiler_for, CompileFn, Field, FieldCategory, MatcherRegistry};

/// A compiled single-field predicate.
pub trait FieldMatcher: Send + Sync + fmt::Debug {
    /// Returns true if the event satisfies this field.
    fn matches(&self, event: &StateChangeEvent) -> bool;
}

struct Compiled {
    logic: Logic,
    fields: Vec<Field>,
    matchers: Vec<Box<dyn FieldMatcher>>,
}

/// An immutable event predicate compiled from a [`FilterSpec`].
///
/// # Examples
///
/// ```
/// use statewatch::{compile, FilterSpec, StateChangeEvent, StateSnapshot};
///
/// let spec = FilterSpec::from_json(serde_json::json!({"id": "hm.0.temp", "valGt": 20})).unwrap();
/// let predicate = compile(&spec);
///
/// let warm = StateChangeEvent::new("hm.0.temp", StateSnapshot::neutral(), StateSnapshot::new(21.5));
/// assert!(predicate.matches(&warm));
/// ```
#[derive(Clone)]
pub struct CompiledPredicate {
    inner: Arc<Compiled>,
}

impl CompiledPredicate {
    /// Evaluates the predicate. Short-circuits per combinator.
    ///
    /// A predicate with no recognized fields passes every event, under either
    /// combinator.
    #[must_use]
    pub fn matches(&self, event: &StateChangeEvent) -> bool {
        let matchers = &self.inner.matchers;
        if matchers.is_empty() {
            return true;
        }
        match self.inner.logic {
            Logic::And => matchers.iter().all(|m| m.matches(event)),
            Logic::Or => matchers.iter().any(|m| m.matches(event)),
        }
    }

    /// Fields that were compiled, in evaluation order.
    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.inner.fields
    }

    /// The combinator in effect.
    #[must_use]
    pub fn logic(&self) -> Logic {
        self.inner.logic
    }

    /// Returns true if no field was recognized.
    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.inner.fields.is_empty()
    }
}

impl fmt::Debug for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledPredicate")
            .field("logic", &self.inner.logic)
            .field("fields", &self.inner.fields)
            .finish()
    }
}

impl MatcherRegistry {
    /// Compiles a filter with this registry.
    #[must_use]
    pub fn compile(&self, spec: &FilterSpec) -> CompiledPredicate {
        let (fields, matchers) = self.compile_fields(spec).into_iter().unzip();
        CompiledPredicate {
            inner: Arc::new(Compiled {
                logic: spec.logic(),
                fields,
                matchers,
            }),
        }
    }
}

/// Compiles a filter with the standard registry.
#[must_use]
pub fn compile(spec: &FilterSpec) -> CompiledPredicate {
    MatcherRegistry::standard().compile(spec)
}
