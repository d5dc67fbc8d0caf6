//! Per-category field matchers.
//!
//! Each struct here is one compiled single-field predicate. They hold only
//! owned, immutable data so a compiled predicate can be shared across threads.

use crate::event::{Membership, StateChangeEvent, StateSnapshot};
use crate::filter::{ChangeKind, QualityPattern, TextPattern};
use crate::value::{CompareOp, StateValue};

use super::FieldMatcher;

/// Which snapshot of the event a matcher reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    New,
    Old,
}

impl Side {
    #[inline]
    fn snapshot(self, event: &StateChangeEvent) -> &StateSnapshot {
        match self {
            Self::New => &event.new_state,
            Self::Old => &event.old_state,
        }
    }
}

/// Event text read by identity matchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Id,
    Name,
    ChannelId,
    ChannelName,
    DeviceId,
    DeviceName,
    Origin(Side),
}

impl TextSource {
    /// Text of the event field; `None` when the event does not carry it.
    fn extract(self, event: &StateChangeEvent) -> Option<&str> {
        match self {
            Self::Id => Some(event.id.as_str()),
            Self::Name => event.name.as_deref(),
            Self::ChannelId => event.channel_id.as_deref(),
            Self::ChannelName => event.channel_name.as_deref(),
            Self::DeviceId => event.device_id.as_deref(),
            Self::DeviceName => event.device_name.as_deref(),
            Self::Origin(side) => {
                let origin = side.snapshot(event).origin.as_str();
                (!origin.is_empty()).then_some(origin)
            }
        }
    }
}

/// Literal, regex or any-of match on an identity field.
///
/// An absent event field never matches; `negate` is applied afterwards, so an
/// absent field passes a negated matcher.
#[derive(Debug)]
pub struct TextMatcher {
    pub(crate) source: TextSource,
    pub(crate) pattern: TextPattern,
    pub(crate) negate: bool,
}

impl FieldMatcher for TextMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let hit = self
            .source
            .extract(event)
            .is_some_and(|text| self.pattern.matches(text));
        hit != self.negate
    }
}

/// Strict (in)equality against a snapshot value.
#[derive(Debug)]
pub struct ValueEquals {
    pub(crate) side: Side,
    pub(crate) expected: StateValue,
    pub(crate) negate: bool,
}

impl FieldMatcher for ValueEquals {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        (self.side.snapshot(event).value == self.expected) != self.negate
    }
}

/// Ordered comparison of a snapshot value against a numeric bound.
#[derive(Debug)]
pub struct ValueBound {
    pub(crate) side: Side,
    pub(crate) op: CompareOp,
    pub(crate) bound: f64,
}

impl FieldMatcher for ValueBound {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let value = self.side.snapshot(event).value.coerce_number();
        self.op.compare(value, self.bound)
    }
}

/// Which snapshot timestamp a time matcher reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clock {
    Timestamp,
    LastChange,
}

impl Clock {
    #[inline]
    fn read(self, snapshot: &StateSnapshot) -> i64 {
        match self {
            Self::Timestamp => snapshot.timestamp,
            Self::LastChange => snapshot.last_change,
        }
    }
}

/// Exact equality on a snapshot timestamp.
#[derive(Debug)]
pub struct TimeEquals {
    pub(crate) side: Side,
    pub(crate) clock: Clock,
    pub(crate) expected: i64,
}

impl FieldMatcher for TimeEquals {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        self.clock.read(self.side.snapshot(event)) == self.expected
    }
}

/// Ordered comparison of a snapshot timestamp against a bound.
#[derive(Debug)]
pub struct TimeBound {
    pub(crate) side: Side,
    pub(crate) clock: Clock,
    pub(crate) op: CompareOp,
    pub(crate) bound: i64,
}

impl FieldMatcher for TimeBound {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let ts = self.clock.read(self.side.snapshot(event));
        self.op.holds(Some(ts.cmp(&self.bound)))
    }
}

/// Relation between the new and the old value.
#[derive(Debug)]
pub struct ChangeMatcher {
    pub(crate) kind: ChangeKind,
}

impl FieldMatcher for ChangeMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let new = &event.new_state.value;
        let old = &event.old_state.value;
        let ordered = |op: CompareOp| op.holds(new.loose_cmp(old));
        match &self.kind {
            ChangeKind::Eq => new == old,
            ChangeKind::Ne => new != old,
            ChangeKind::Gt => ordered(CompareOp::Gt),
            ChangeKind::Ge => ordered(CompareOp::Ge),
            ChangeKind::Lt => ordered(CompareOp::Lt),
            ChangeKind::Le => ordered(CompareOp::Le),
            ChangeKind::Any | ChangeKind::Unrecognized(_) => true,
        }
    }
}

/// Acknowledgement flag requirement.
#[derive(Debug)]
pub struct AckMatcher {
    pub(crate) side: Side,
    pub(crate) expected: bool,
}

impl FieldMatcher for AckMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        self.side.snapshot(event).acknowledged == self.expected
    }
}

/// Quality code requirement.
#[derive(Debug)]
pub struct QualityMatcher {
    pub(crate) side: Side,
    pub(crate) pattern: QualityPattern,
}

impl FieldMatcher for QualityMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        match self.pattern {
            QualityPattern::Any => true,
            QualityPattern::Code(code) => self.side.snapshot(event).quality == Some(code),
        }
    }
}

/// Membership test against the event's enum ids.
#[derive(Debug)]
pub struct EnumIdMatcher {
    pub(crate) pattern: TextPattern,
}

impl FieldMatcher for EnumIdMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let Some(ids) = member_list(event, "enumId", event.enum_ids.as_ref()) else {
            return false;
        };
        ids.iter().any(|id| self.pattern.matches(id))
    }
}

/// Membership test against the event's enum names.
///
/// A localized name counts as a member when any of its translations matches.
#[derive(Debug)]
pub struct EnumNameMatcher {
    pub(crate) pattern: TextPattern,
}

impl FieldMatcher for EnumNameMatcher {
    fn matches(&self, event: &StateChangeEvent) -> bool {
        let Some(names) = member_list(event, "enumName", event.enum_names.as_ref()) else {
            return false;
        };
        names
            .iter()
            .any(|name| name.any_text(|text| self.pattern.matches(text)))
    }
}

fn member_list<'a, T>(
    event: &StateChangeEvent,
    field: &'static str,
    membership: Option<&'a Membership<T>>,
) -> Option<&'a [T]> {
    match membership {
        Some(Membership::List(items)) => Some(items),
        Some(Membership::Malformed(_)) => {
            tracing::warn!(field, state_id = %event.id, "enum metadata is not a list; filter does not match");
            None
        }
        None => {
            tracing::warn!(field, state_id = %event.id, "event carries no enum metadata; filter does not match");
            None
        }
    }
}
