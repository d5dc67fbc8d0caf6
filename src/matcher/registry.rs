//! The closed set of filter fields and the compiler registered for each.

use std::fmt;
use std::sync::OnceLock;

use serde_json::Number;

use crate::filter::{FilterSpec, TextPattern};
use crate::value::CompareOp;

use super::fields::{
    AckMatcher, ChangeMatcher, Clock, EnumIdMatcher, EnumNameMatcher, QualityMatcher, Side,
    TextMatcher, TextSource, TimeBound, TimeEquals, ValueBound, ValueEquals,
};
use super::FieldMatcher;

/// A recognized filter field. `logic` is a control key and has no entry.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Id,
    Name,
    ChannelId,
    ChannelName,
    DeviceId,
    DeviceName,
    From,
    FromNe,
    OldFrom,
    OldFromNe,
    EnumId,
    EnumName,
    Change,
    Val,
    ValNe,
    ValGt,
    ValGe,
    ValLt,
    ValLe,
    OldVal,
    OldValNe,
    OldValGt,
    OldValGe,
    OldValLt,
    OldValLe,
    Ts,
    TsGt,
    TsGe,
    TsLt,
    TsLe,
    OldTs,
    OldTsGt,
    OldTsGe,
    OldTsLt,
    OldTsLe,
    Lc,
    LcGt,
    LcGe,
    LcLt,
    LcLe,
    OldLc,
    OldLcGt,
    OldLcGe,
    OldLcLt,
    OldLcLe,
    Ack,
    OldAck,
    Q,
    OldQ,
}

/// Matcher family a field belongs to.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldCategory {
    Identity,
    ValueEquality,
    ValueInequality,
    NumericComparison,
    TimestampEquality,
    ChangeKind,
    Acknowledgement,
    Quality,
    Membership,
}

impl Field {
    /// Every field, in compilation order.
    pub const ALL: [Self; 49] = [
        Self::Id,
        Self::Name,
        Self::ChannelId,
        Self::ChannelName,
        Self::DeviceId,
        Self::DeviceName,
        Self::From,
        Self::FromNe,
        Self::OldFrom,
        Self::OldFromNe,
        Self::EnumId,
        Self::EnumName,
        Self::Change,
        Self::Val,
        Self::ValNe,
        Self::ValGt,
        Self::ValGe,
        Self::ValLt,
        Self::ValLe,
        Self::OldVal,
        Self::OldValNe,
        Self::OldValGt,
        Self::OldValGe,
        Self::OldValLt,
        Self::OldValLe,
        Self::Ts,
        Self::TsGt,
        Self::TsGe,
        Self::TsLt,
        Self::TsLe,
        Self::OldTs,
        Self::OldTsGt,
        Self::OldTsGe,
        Self::OldTsLt,
        Self::OldTsLe,
        Self::Lc,
        Self::LcGt,
        Self::LcGe,
        Self::LcLt,
        Self::LcLe,
        Self::OldLc,
        Self::OldLcGt,
        Self::OldLcGe,
        Self::OldLcLt,
        Self::OldLcLe,
        Self::Ack,
        Self::OldAck,
        Self::Q,
        Self::OldQ,
    ];

    /// The JSON key of this field.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::ChannelId => "channelId",
            Self::ChannelName => "channelName",
            Self::DeviceId => "deviceId",
            Self::DeviceName => "deviceName",
            Self::From => "from",
            Self::FromNe => "fromNe",
            Self::OldFrom => "oldFrom",
            Self::OldFromNe => "oldFromNe",
            Self::EnumId => "enumId",
            Self::EnumName => "enumName",
            Self::Change => "change",
            Self::Val => "val",
            Self::ValNe => "valNe",
            Self::ValGt => "valGt",
            Self::ValGe => "valGe",
            Self::ValLt => "valLt",
            Self::ValLe => "valLe",
            Self::OldVal => "oldVal",
            Self::OldValNe => "oldValNe",
            Self::OldValGt => "oldValGt",
            Self::OldValGe => "oldValGe",
            Self::OldValLt => "oldValLt",
            Self::OldValLe => "oldValLe",
            Self::Ts => "ts",
            Self::TsGt => "tsGt",
            Self::TsGe => "tsGe",
            Self::TsLt => "tsLt",
            Self::TsLe => "tsLe",
            Self::OldTs => "oldTs",
            Self::OldTsGt => "oldTsGt",
            Self::OldTsGe => "oldTsGe",
            Self::OldTsLt => "oldTsLt",
            Self::OldTsLe => "oldTsLe",
            Self::Lc => "lc",
            Self::LcGt => "lcGt",
            Self::LcGe => "lcGe",
            Self::LcLt => "lcLt",
            Self::LcLe => "lcLe",
            Self::OldLc => "oldLc",
            Self::OldLcGt => "oldLcGt",
            Self::OldLcGe => "oldLcGe",
            Self::OldLcLt => "oldLcLt",
            Self::OldLcLe => "oldLcLe",
            Self::Ack => "ack",
            Self::OldAck => "oldAck",
            Self::Q => "q",
            Self::OldQ => "oldQ",
        }
    }

    /// Looks a field up by its JSON key.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.wire_name() == name)
    }

    /// The matcher family of this field.
    #[must_use]
    pub const fn category(self) -> FieldCategory {
        match self {
            Self::Id
            | Self::Name
            | Self::ChannelId
            | Self::ChannelName
            | Self::DeviceId
            | Self::DeviceName
            | Self::From
            | Self::FromNe
            | Self::OldFrom
            | Self::OldFromNe => FieldCategory::Identity,
            Self::EnumId | Self::EnumName => FieldCategory::Membership,
            Self::Change => FieldCategory::ChangeKind,
            Self::Val | Self::OldVal => FieldCategory::ValueEquality,
            Self::ValNe | Self::OldValNe => FieldCategory::ValueInequality,
            Self::Ts | Self::OldTs | Self::Lc | Self::OldLc => FieldCategory::TimestampEquality,
            Self::Ack | Self::OldAck => FieldCategory::Acknowledgement,
            Self::Q | Self::OldQ => FieldCategory::Quality,
            _ => FieldCategory::NumericComparison,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Compiles one field of a filter; `None` when the field is absent.
pub type CompileFn = fn(&FilterSpec) -> Option<Box<dyn FieldMatcher>>;

fn boxed<M: FieldMatcher + 'static>(m: M) -> Box<dyn FieldMatcher> {
    Box::new(m)
}

fn text(source: TextSource, negate: bool, pattern: Option<&TextPattern>) -> Option<Box<dyn FieldMatcher>> {
    pattern.map(|p| {
        boxed(TextMatcher {
            source,
            pattern: p.clone(),
            negate,
        })
    })
}

fn value_bound(side: Side, op: CompareOp, bound: Option<&Number>) -> Option<Box<dyn FieldMatcher>> {
    bound.map(|n| {
        boxed(ValueBound {
            side,
            op,
            bound: n.as_f64().unwrap_or(f64::NAN),
        })
    })
}

fn time_bound(side: Side, clock: Clock, op: CompareOp, bound: Option<i64>) -> Option<Box<dyn FieldMatcher>> {
    bound.map(|bound| boxed(TimeBound { side, clock, op, bound }))
}

fn time_equals(side: Side, clock: Clock, expected: Option<i64>) -> Option<Box<dyn FieldMatcher>> {
    expected.map(|expected| boxed(TimeEquals { side, clock, expected }))
}

/// The compiler for a field.
///
/// The match is exhaustive, so adding a `Field` without a compiler fails to
/// build.
#[must_use]
pub fn compiler_for(field: Field) -> CompileFn {
    use CompareOp::{Ge, Gt, Le, Lt};
    use Side::{New, Old};

    match field {
        Field::Id => |s| text(TextSource::Id, false, s.id.as_ref()),
        Field::Name => |s| text(TextSource::Name, false, s.name.as_ref()),
        Field::ChannelId => |s| text(TextSource::ChannelId, false, s.channel_id.as_ref()),
        Field::ChannelName => |s| text(TextSource::ChannelName, false, s.channel_name.as_ref()),
        Field::DeviceId => |s| text(TextSource::DeviceId, false, s.device_id.as_ref()),
        Field::DeviceName => |s| text(TextSource::DeviceName, false, s.device_name.as_ref()),
        Field::From => |s| text(TextSource::Origin(New), false, s.from.as_ref()),
        Field::FromNe => |s| text(TextSource::Origin(New), true, s.from_ne.as_ref()),
        Field::OldFrom => |s| text(TextSource::Origin(Old), false, s.old_from.as_ref()),
        Field::OldFromNe => |s| text(TextSource::Origin(Old), true, s.old_from_ne.as_ref()),

        Field::EnumId => |s| {
            s.enum_id
                .clone()
                .map(|pattern| boxed(EnumIdMatcher { pattern }))
        },
        Field::EnumName => |s| {
            s.enum_name
                .clone()
                .map(|pattern| boxed(EnumNameMatcher { pattern }))
        },

        Field::Change => |s| s.change.clone().map(|kind| boxed(ChangeMatcher { kind })),

        Field::Val => |s| {
            s.val.clone().map(|expected| {
                boxed(ValueEquals {
                    side: New,
                    expected,
                    negate: false,
                })
            })
        },
        Field::ValNe => |s| {
            s.val_ne.clone().map(|expected| {
                boxed(ValueEquals {
                    side: New,
                    expected,
                    negate: true,
                })
            })
        },
        Field::ValGt => |s| value_bound(New, Gt, s.val_gt.as_ref()),
        Field::ValGe => |s| value_bound(New, Ge, s.val_ge.as_ref()),
        Field::ValLt => |s| value_bound(New, Lt, s.val_lt.as_ref()),
        Field::ValLe => |s| value_bound(New, Le, s.val_le.as_ref()),

        Field::OldVal => |s| {
            s.old_val.clone().map(|expected| {
                boxed(ValueEquals {
                    side: Old,
                    expected,
                    negate: false,
                })
            })
        },
        Field::OldValNe => |s| {
            s.old_val_ne.clone().map(|expected| {
                boxed(ValueEquals {
                    side: Old,
                    expected,
                    negate: true,
                })
            })
        },
        Field::OldValGt => |s| value_bound(Old, Gt, s.old_val_gt.as_ref()),
        Field::OldValGe => |s| value_bound(Old, Ge, s.old_val_ge.as_ref()),
        Field::OldValLt => |s| value_bound(Old, Lt, s.old_val_lt.as_ref()),
        Field::OldValLe => |s| value_bound(Old, Le, s.old_val_le.as_ref()),

        Field::Ts => |s| time_equals(New, Clock::Timestamp, s.ts),
        Field::TsGt => |s| time_bound(New, Clock::Timestamp, Gt, s.ts_gt),
        Field::TsGe => |s| time_bound(New, Clock::Timestamp, Ge, s.ts_ge),
        Field::TsLt => |s| time_bound(New, Clock::Timestamp, Lt, s.ts_lt),
        Field::TsLe => |s| time_bound(New, Clock::Timestamp, Le, s.ts_le),

        Field::OldTs => |s| time_equals(Old, Clock::Timestamp, s.old_ts),
        Field::OldTsGt => |s| time_bound(Old, Clock::Timestamp, Gt, s.old_ts_gt),
        Field::OldTsGe => |s| time_bound(Old, Clock::Timestamp, Ge, s.old_ts_ge),
        Field::OldTsLt => |s| time_bound(Old, Clock::Timestamp, Lt, s.old_ts_lt),
        Field::OldTsLe => |s| time_bound(Old, Clock::Timestamp, Le, s.old_ts_le),

        Field::Lc => |s| time_equals(New, Clock::LastChange, s.lc),
        Field::LcGt => |s| time_bound(New, Clock::LastChange, Gt, s.lc_gt),
        Field::LcGe => |s| time_bound(New, Clock::LastChange, Ge, s.lc_ge),
        Field::LcLt => |s| time_bound(New, Clock::LastChange, Lt, s.lc_lt),
        Field::LcLe => |s| time_bound(New, Clock::LastChange, Le, s.lc_le),

        Field::OldLc => |s| time_equals(Old, Clock::LastChange, s.old_lc),
        Field::OldLcGt => |s| time_bound(Old, Clock::LastChange, Gt, s.old_lc_gt),
        Field::OldLcGe => |s| time_bound(Old, Clock::LastChange, Ge, s.old_lc_ge),
        Field::OldLcLt => |s| time_bound(Old, Clock::LastChange, Lt, s.old_lc_lt),
        Field::OldLcLe => |s| time_bound(Old, Clock::LastChange, Le, s.old_lc_le),

        Field::Ack => |s| s.ack.map(|flag| boxed(AckMatcher { side: New, expected: flag.0 })),
        Field::OldAck => |s| s.old_ack.map(|flag| boxed(AckMatcher { side: Old, expected: flag.0 })),

        Field::Q => |s| s.q.map(|pattern| boxed(QualityMatcher { side: New, pattern })),
        Field::OldQ => |s| s.old_q.map(|pattern| boxed(QualityMatcher { side: Old, pattern })),
    }
}

/// Field → compiler table.
pub struct MatcherRegistry {
    compilers: Vec<(Field, CompileFn)>,
}

impl MatcherRegistry {
    /// The standard registry covering every [`Field`], built once.
    #[must_use]
    pub fn standard() -> &'static Self {
        static STANDARD: OnceLock<MatcherRegistry> = OnceLock::new();
        STANDARD.get_or_init(|| Self {
            compilers: Field::ALL.iter().map(|&f| (f, compiler_for(f))).collect(),
        })
    }

    /// Number of registered fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.compilers.len()
    }

    /// Returns true if no fields are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.compilers.is_empty()
    }

    /// Compiles every present field of `spec`, in registry order.
    pub(crate) fn compile_fields(&self, spec: &FilterSpec) -> Vec<(Field, Box<dyn FieldMatcher>)> {
        self.compilers
            .iter()
            .filter_map(|(field, compile)| compile(spec).map(|m| (*field, m)))
            .collect()
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("fields", &self.compilers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_names_are_unique_and_round_trip() {
        let mut seen = std::collections::HashSet::new();
        for field in Field::ALL {
            assert!(seen.insert(field.wire_name()), "duplicate {field}");
            assert_eq!(Field::from_wire_name(field.wire_name()), Some(field));
        }
        assert_eq!(Field::from_wire_name("logic"), None);
        assert_eq!(Field::from_wire_name("valgt"), None);
    }

    #[test]
    fn test_every_wire_name_is_a_filter_key() {
        // Each field compiles from a filter that carries only its own key.
        for field in Field::ALL {
            let value = match field.category() {
                FieldCategory::Identity | FieldCategory::Membership => json!("x"),
                FieldCategory::ChangeKind => json!("eq"),
                FieldCategory::Acknowledgement => json!(true),
                FieldCategory::Quality => json!("*"),
                _ => json!(1),
            };
            let mut obj = serde_json::Map::new();
            obj.insert(field.wire_name().to_string(), value);
            let spec = FilterSpec::from_json(serde_json::Value::Object(obj)).unwrap();
            let compiled = MatcherRegistry::standard().compile_fields(&spec);
            assert_eq!(compiled.len(), 1, "{field}");
            assert_eq!(compiled[0].0, field);
        }
    }

    #[test]
    fn test_standard_registry_covers_all_fields() {
        let registry = MatcherRegistry::standard();
        assert_eq!(registry.len(), Field::ALL.len());
        assert!(!registry.is_empty());
        assert!(std::ptr::eq(registry, MatcherRegistry::standard()));
    }

    #[test]
    fn test_categories() {
        assert_eq!(Field::FromNe.category(), FieldCategory::Identity);
        assert_eq!(Field::OldLcLe.category(), FieldCategory::NumericComparison);
        assert_eq!(Field::OldTs.category(), FieldCategory::TimestampEquality);
        assert_eq!(Field::ValNe.category(), FieldCategory::ValueInequality);
        assert_eq!(Field::EnumName.category(), FieldCategory::Membership);
    }
}
