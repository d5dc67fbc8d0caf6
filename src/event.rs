//! State snapshots and state-change events.
//!
//! Events are produced by the state store collaborator and consumed by the
//! dispatcher. Wire names follow the store (`val`, `ack`, `ts`, `lc`, `from`,
//! `q`) so events can be deserialized straight off the bus.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value::StateValue;

/// One state at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Current value.
    #[serde(rename = "val", default)]
    pub value: StateValue,
    /// Whether the value was acknowledged by its owning adapter.
    #[serde(rename = "ack", default)]
    pub acknowledged: bool,
    /// Update timestamp (milliseconds since the Unix epoch).
    #[serde(rename = "ts", default)]
    pub timestamp: i64,
    /// Timestamp of the last actual value change.
    #[serde(rename = "lc", default)]
    pub last_change: i64,
    /// Writer of the value (adapter instance, script, user).
    #[serde(rename = "from", default)]
    pub origin: String,
    /// Raw quality code, if the producer reported one.
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
}

impl StateSnapshot {
    /// Creates an unacknowledged snapshot stamped with the current time.
    #[must_use]
    pub fn new(value: impl Into<StateValue>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            value: value.into(),
            acknowledged: false,
            timestamp: now,
            last_change: now,
            origin: String::new(),
            quality: None,
        }
    }

    /// The neutral snapshot a producer synthesizes on first observation.
    #[must_use]
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Sets the acknowledged flag.
    #[must_use]
    pub fn with_ack(mut self, acknowledged: bool) -> Self {
        self.acknowledged = acknowledged;
        self
    }

    /// Sets the origin.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Sets both the update timestamp and the last-change timestamp.
    #[must_use]
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        let ms = at.timestamp_millis();
        self.timestamp = ms;
        self.last_change = ms;
        self
    }

    /// Sets the update timestamp (milliseconds).
    #[must_use]
    pub fn with_timestamp(mut self, ms: i64) -> Self {
        self.timestamp = ms;
        self
    }

    /// Sets the last-change timestamp (milliseconds).
    #[must_use]
    pub fn with_last_change(mut self, ms: i64) -> Self {
        self.last_change = ms;
        self
    }

    /// Sets the quality code.
    #[must_use]
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Update timestamp as a UTC datetime, if representable.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

/// An enum display name: plain text or a map of language code to text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedText {
    Plain(String),
    Translations(BTreeMap<String, String>),
}

impl LocalizedText {
    /// Returns true if `f` holds for the plain text or for any translation.
    pub fn any_text(&self, mut f: impl FnMut(&str) -> bool) -> bool {
        match self {
            Self::Plain(s) => f(s),
            Self::Translations(map) => map.values().any(|s| f(s)),
        }
    }
}

impl From<&str> for LocalizedText {
    fn from(v: &str) -> Self {
        Self::Plain(v.to_string())
    }
}

impl From<String> for LocalizedText {
    fn from(v: String) -> Self {
        Self::Plain(v)
    }
}

/// Category-membership metadata as delivered by the producer.
///
/// Metadata that is not a list of the expected element type is kept verbatim
/// as `Malformed` so membership matchers can fail closed on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Membership<T> {
    List(Vec<T>),
    Malformed(serde_json::Value),
}

impl<T> Membership<T> {
    /// The member list, or `None` when the metadata is malformed.
    pub fn as_list(&self) -> Option<&[T]> {
        match self {
            Self::List(v) => Some(v),
            Self::Malformed(_) => None,
        }
    }
}

impl<T> From<Vec<T>> for Membership<T> {
    fn from(v: Vec<T>) -> Self {
        Self::List(v)
    }
}

/// The unit dispatched to the engine: a before/after pair of snapshots plus
/// identity and category metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeEvent {
    /// State identifier.
    pub id: String,
    /// Common name of the state object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Snapshot before the change.
    pub old_state: StateSnapshot,
    /// Snapshot after the change.
    pub new_state: StateSnapshot,
    /// Enum ids the state belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_ids: Option<Membership<String>>,
    /// Enum display names the state belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_names: Option<Membership<LocalizedText>>,
    /// Id of the channel containing the state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Display name of the containing channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_name: Option<String>,
    /// Id of the device containing the state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Display name of the containing device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
}

impl StateChangeEvent {
    /// Creates an event without enum/channel/device metadata.
    #[must_use]
    pub fn new(id: impl Into<String>, old_state: StateSnapshot, new_state: StateSnapshot) -> Self {
        Self {
            id: id.into(),
            name: None,
            old_state,
            new_state,
            enum_ids: None,
            enum_names: None,
            channel_id: None,
            channel_name: None,
            device_id: None,
            device_name: None,
        }
    }

    /// Sets the common name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the enum ids.
    #[must_use]
    pub fn with_enum_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_ids = Some(Membership::List(ids.into_iter().map(Into::into).collect()));
        self
    }

    /// Sets the enum names.
    #[must_use]
    pub fn with_enum_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<LocalizedText>,
    {
        self.enum_names = Some(Membership::List(names.into_iter().map(Into::into).collect()));
        self
    }

    /// Sets the parent channel.
    #[must_use]
    pub fn with_channel(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.channel_id = Some(id.into());
        self.channel_name = Some(name.into());
        self
    }

    /// Sets the parent device.
    #[must_use]
    pub fn with_device(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.device_id = Some(id.into());
        self.device_name = Some(name.into());
        self
    }
}
