//! Filter specifications: the declarative description of which state-change
//! events a subscriber wants to observe.
//!
//! `FilterSpec` is the wire contract with existing scripts. Field names are the
//! camelCase keys scripts have always used (`val`, `oldValGt`, `enumId`, ...).
//! Unknown keys are ignored so older engines accept newer filters.
//!
//! JSON has no regular-expression type, so a string written as `/source/flags`
//! is read as a regular expression. Every other string is a literal.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Number;

use crate::error::{ValidationError, WatchResult};
use crate::value::StateValue;

/// A compiled regular expression that remembers how it was written.
///
/// Two literals are equal when their source and flags are equal.
#[derive(Clone)]
pub struct RegexLiteral {
    source: String,
    flags: String,
    regex: Regex,
}

impl RegexLiteral {
    /// Compiles `source` with the given flags.
    ///
    /// Supported flags: `i` (case-insensitive), `m` (multi-line), `s` (dot
    /// matches newline). `g`, `u` and `d` are accepted and have no effect.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedRegexFlag` for any other flag and `InvalidRegex` if
    /// the source does not compile.
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Result<Self, ValidationError> {
        let source = source.into();
        let flags = flags.into();

        let mut builder = RegexBuilder::new(&source);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'g' | 'u' | 'd' => {}
                other => return Err(ValidationError::UnsupportedRegexFlag { flag: other }),
            }
        }

        let regex = builder.build().map_err(|e| ValidationError::InvalidRegex {
            pattern: source.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self { source, flags, regex })
    }

    /// Parses the `/source/flags` notation.
    ///
    /// Returns `None` when `text` is not written in that notation.
    pub fn parse(text: &str) -> Option<Result<Self, ValidationError>> {
        let rest = text.strip_prefix('/')?;
        let close = rest.rfind('/')?;
        let (source, flags) = (&rest[..close], &rest[close + 1..]);
        if !flags.chars().all(|c| c.is_ascii_alphabetic()) {
            return None;
        }
        Some(Self::new(source, flags))
    }

    /// The expression source, without delimiters.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The flags the expression was written with.
    #[must_use]
    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// Returns true if the expression matches anywhere in `text`.
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for RegexLiteral {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

impl fmt::Debug for RegexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegexLiteral({self})")
    }
}

impl fmt::Display for RegexLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

/// String-matching pattern used by identity and membership fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TextRepr", into = "TextRepr")]
pub enum TextPattern {
    /// Exact equality.
    Literal(String),
    /// Regular-expression search.
    Regex(RegexLiteral),
    /// Equality with any element.
    AnyOf(Vec<String>),
}

impl TextPattern {
    /// Creates a literal pattern.
    #[must_use]
    pub fn literal(text: impl Into<String>) -> Self {
        Self::Literal(text.into())
    }

    /// Creates a regular-expression pattern.
    ///
    /// # Errors
    ///
    /// See [`RegexLiteral::new`].
    pub fn regex(source: impl Into<String>, flags: impl Into<String>) -> Result<Self, ValidationError> {
        Ok(Self::Regex(RegexLiteral::new(source, flags)?))
    }

    /// Creates an any-of pattern.
    #[must_use]
    pub fn any_of<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AnyOf(items.into_iter().map(Into::into).collect())
    }

    /// Tests a single text value.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Literal(s) => s == text,
            Self::Regex(re) => re.is_match(text),
            Self::AnyOf(items) => items.iter().any(|s| s == text),
        }
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{s:?}"),
            Self::Regex(re) => write!(f, "{re}"),
            Self::AnyOf(items) => write!(f, "{items:?}"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TextRepr {
    One(String),
    Many(Vec<String>),
}

impl TryFrom<TextRepr> for TextPattern {
    type Error = ValidationError;

    fn try_from(repr: TextRepr) -> Result<Self, Self::Error> {
        match repr {
            TextRepr::One(s) => match RegexLiteral::parse(&s) {
                Some(re) => Ok(Self::Regex(re?)),
                None => Ok(Self::Literal(s)),
            },
            TextRepr::Many(items) => Ok(Self::AnyOf(items)),
        }
    }
}

impl From<TextPattern> for TextRepr {
    fn from(p: TextPattern) -> Self {
        match p {
            TextPattern::Literal(s) => Self::One(s),
            TextPattern::Regex(re) => Self::One(re.to_string()),
            TextPattern::AnyOf(items) => Self::Many(items),
        }
    }
}

/// How sibling field predicates combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    /// Every field predicate must pass.
    #[default]
    And,
    /// At least one field predicate must pass.
    Or,
}

/// Required relation between the new and the old value.
///
/// Strings other than the known operators are retained verbatim and place no
/// constraint on the event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeKind {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    /// `any` or `*`.
    Any,
    Unrecognized(String),
}

impl From<String> for ChangeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            "gt" => Self::Gt,
            "ge" => Self::Ge,
            "lt" => Self::Lt,
            "le" => Self::Le,
            "any" | "*" => Self::Any,
            _ => Self::Unrecognized(s),
        }
    }
}

impl From<ChangeKind> for String {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Eq => "eq".to_string(),
            ChangeKind::Ne => "ne".to_string(),
            ChangeKind::Gt => "gt".to_string(),
            ChangeKind::Ge => "ge".to_string(),
            ChangeKind::Lt => "lt".to_string(),
            ChangeKind::Le => "le".to_string(),
            ChangeKind::Any => "any".to_string(),
            ChangeKind::Unrecognized(s) => s,
        }
    }
}

/// Acknowledgement requirement.
///
/// `true` and `"true"` require an acknowledged snapshot; every other value
/// requires an unacknowledged one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AckRepr", into = "bool")]
pub struct AckFlag(pub bool);

#[derive(Deserialize)]
#[serde(untagged)]
enum AckRepr {
    Bool(bool),
    Text(String),
    Other(serde_json::Value),
}

impl From<AckRepr> for AckFlag {
    fn from(repr: AckRepr) -> Self {
        match repr {
            AckRepr::Bool(b) => Self(b),
            AckRepr::Text(s) => Self(s == "true"),
            AckRepr::Other(_) => Self(false),
        }
    }
}

impl From<AckFlag> for bool {
    fn from(flag: AckFlag) -> Self {
        flag.0
    }
}

/// Quality requirement: `"*"` or an exact quality code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QualityRepr", into = "QualityRepr")]
pub enum QualityPattern {
    Any,
    Code(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum QualityRepr {
    Code(u32),
    Text(String),
}

impl TryFrom<QualityRepr> for QualityPattern {
    type Error = ValidationError;

    fn try_from(repr: QualityRepr) -> Result<Self, Self::Error> {
        match repr {
            QualityRepr::Code(c) => Ok(Self::Code(c)),
            QualityRepr::Text(s) if s == "*" => Ok(Self::Any),
            QualityRepr::Text(s) => Err(ValidationError::InvalidFilter {
                reason: format!("quality must be \"*\" or a quality code, got {s:?}"),
            }),
        }
    }
}

impl From<QualityPattern> for QualityRepr {
    fn from(q: QualityPattern) -> Self {
        match q {
            QualityPattern::Any => Self::Text("*".to_string()),
            QualityPattern::Code(c) => Self::Code(c),
        }
    }
}

/// Keeps an explicit `null` distinct from an absent key.
fn present<'de, D>(deserializer: D) -> Result<Option<StateValue>, D::Error>
where
    D: Deserializer<'de>,
{
    StateValue::deserialize(deserializer).map(Some)
}

/// A present numeric bound. An explicit `null` bounds at `0`.
fn value_bound<'de, D>(deserializer: D) -> Result<Option<Number>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Number>::deserialize(deserializer).map(|n| Some(n.unwrap_or_else(|| Number::from(0))))
}

/// A present timestamp bound. An explicit `null` bounds at `0`.
fn time_bound<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(|ts| Some(ts.unwrap_or(0)))
}

/// Declarative filter over state-change events.
///
/// Every field is optional; absent fields place no constraint. See the field
/// matcher registry for the exact per-field semantics.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic: Option<Logic>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_ne: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_from: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_from_ne: Option<TextPattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_id: Option<TextPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_name: Option<TextPattern>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change: Option<ChangeKind>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub val: Option<StateValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub val_ne: Option<StateValue>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub val_gt: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub val_ge: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub val_lt: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub val_le: Option<Number>,

    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub old_val: Option<StateValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub old_val_ne: Option<StateValue>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub old_val_gt: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub old_val_ge: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub old_val_lt: Option<Number>,
    #[serde(default, deserialize_with = "value_bound", skip_serializing_if = "Option::is_none")]
    pub old_val_le: Option<Number>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub ts_gt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub ts_ge: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub ts_lt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub ts_le: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_ts: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_ts_gt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_ts_ge: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_ts_lt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_ts_le: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lc: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub lc_gt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub lc_ge: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub lc_lt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub lc_le: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_lc: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_lc_gt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_lc_ge: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_lc_lt: Option<i64>,
    #[serde(default, deserialize_with = "time_bound", skip_serializing_if = "Option::is_none")]
    pub old_lc_le: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_ack: Option<AckFlag>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<QualityPattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_q: Option<QualityPattern>,
}

impl FilterSpec {
    /// An empty filter: matches every event.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// A filter on a single state id.
    #[must_use]
    pub fn for_state(id: impl Into<String>) -> Self {
        Self {
            id: Some(TextPattern::literal(id)),
            ..Self::default()
        }
    }

    /// Parses a filter from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFilter` when a recognized key carries a value of the
    /// wrong shape or an invalid regular expression.
    pub fn from_json(value: serde_json::Value) -> WatchResult<Self> {
        serde_json::from_value(value).map_err(|e| invalid_filter(&e))
    }

    /// Parses a filter from JSON text.
    ///
    /// # Errors
    ///
    /// See [`FilterSpec::from_json`].
    pub fn from_json_str(text: &str) -> WatchResult<Self> {
        serde_json::from_str(text).map_err(|e| invalid_filter(&e))
    }

    /// Serializes the filter back to its wire form.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// The effective combinator.
    #[must_use]
    pub fn logic(&self) -> Logic {
        self.logic.unwrap_or_default()
    }

    /// Sets the combinator.
    #[must_use]
    pub fn with_logic(mut self, logic: Logic) -> Self {
        self.logic = Some(logic);
        self
    }

    /// Returns true if the `id` field names `state_id`: literally, as an
    /// element of a list, or as a regular expression written `/source/flags`
    /// exactly as `state_id`.
    #[must_use]
    pub fn targets_state(&self, state_id: &str) -> bool {
        match &self.id {
            Some(TextPattern::Literal(s)) => s == state_id,
            Some(TextPattern::AnyOf(items)) => items.iter().any(|s| s == state_id),
            Some(TextPattern::Regex(re)) => re.to_string() == state_id,
            None => false,
        }
    }
}

fn invalid_filter(err: &serde_json::Error) -> crate::error::WatchError {
    ValidationError::InvalidFilter {
        reason: err.to_string(),
    }
    .into()
}
