//! State values carried by snapshots and filters.
//!
//! The state store is untyped: a value is a string, a number, a boolean or
//! absent. Equality is strict (kinds never coerce), while ordered comparisons
//! follow the loose coercion rules scripts have always relied on.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held by a state.
///
/// # Examples
///
/// ```
/// use statewatch::StateValue;
///
/// let temp = StateValue::from(21.5);
/// let label = StateValue::from("on");
///
/// assert!(temp.is_number());
/// assert_ne!(StateValue::from(1), StateValue::from("1"));
/// assert!(label.as_str().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl StateValue {
    /// Returns true for an absent or null value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for a boolean value.
    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    /// Returns true for a numeric value.
    pub const fn is_number(&self) -> bool {
        matches!(self, Self::Number(_))
    }

    /// Returns true for a string value.
    pub const fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    /// The boolean payload, if this is a boolean.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// The numeric payload, if this is a number.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
        }
    }

    /// Numeric view used by ordered comparisons.
    ///
    /// Absent is `0`, booleans are `0`/`1`, numeric strings parse (blank strings
    /// are `0`), anything else is NaN so every ordered comparison fails.
    #[must_use]
    pub fn coerce_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
            Self::Number(v) => *v,
            Self::String(s) => {
                let t = s.trim();
                if t.is_empty() {
                    0.0
                } else {
                    t.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
        }
    }

    /// Loose ordering between two state values.
    ///
    /// Two strings compare lexicographically; every other pairing compares the
    /// coerced numbers. `None` means the values are unordered (NaN involved).
    #[must_use]
    pub fn loose_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.as_str().cmp(b.as_str())),
            _ => self.coerce_number().partial_cmp(&other.coerce_number()),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

/// Ordered comparison operator encoded in a filter field suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    /// Applies the operator to an ordering. Unordered operands never pass.
    #[must_use]
    pub const fn holds(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            None => false,
            Some(o) => match self {
                Self::Gt => matches!(o, Ordering::Greater),
                Self::Ge => matches!(o, Ordering::Greater | Ordering::Equal),
                Self::Lt => matches!(o, Ordering::Less),
                Self::Le => matches!(o, Ordering::Less | Ordering::Equal),
            },
        }
    }

    /// Compares two floats.
    #[must_use]
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        self.holds(lhs.partial_cmp(&rhs))
    }

    /// Field-name suffix for this operator (`Gt`, `Ge`, `Lt`, `Le`).
    #[must_use]
    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Gt => "Gt",
            Self::Ge => "Ge",
            Self::Lt => "Lt",
            Self::Le => "Le",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gt => write!(f, ">"),
            Self::Ge => write!(f, ">="),
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
        }
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<i64> for StateValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(v: i64) -> Self {
        Self::Number(v as f64)
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl<T: Into<StateValue>> From<Option<T>> for StateValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
