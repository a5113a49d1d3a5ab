//! Event Patterns
//!
//! Dot-namespaced topic names (`sales.order.created`) and the universal
//! wildcard `*`. Only exact and universal matching are supported; prefix
//! wildcards such as `sales.*` would be added in [`EventPattern::matches`].

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use crate::error::{BusError, BusResult};

/// The universal wildcard pattern
pub const WILDCARD: &str = "*";

/// Emitted after `register_module` stores a module
pub const MODULE_REGISTERED: &str = "global.eventbus.module-registered";

/// Emitted after a module becomes active
pub const MODULE_ACTIVATED: &str = "global.eventbus.module-activated";

/// Emitted after a module becomes inactive
pub const MODULE_DEACTIVATED: &str = "global.eventbus.module-deactivated";

/// Emitted for every isolated handler failure
pub const HANDLER_ERROR: &str = "global.eventbus.error";

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("segment regex is valid")
});

/// Immutable event topic used as a lookup key
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventPattern(Arc<str>);

impl EventPattern {
    /// Parse and validate a pattern
    pub fn new(pattern: &str) -> BusResult<Self> {
        if pattern == WILDCARD {
            return Ok(Self(Arc::from(WILDCARD)));
        }
        if pattern.is_empty() {
            return Err(BusError::invalid_pattern(pattern, "pattern is empty"));
        }
        for segment in pattern.split('.') {
            if segment.is_empty() {
                return Err(BusError::invalid_pattern(pattern, "empty segment"));
            }
            if segment == WILDCARD {
                return Err(BusError::invalid_pattern(
                    pattern,
                    "only the universal '*' wildcard is supported",
                ));
            }
            if !SEGMENT.is_match(segment) {
                return Err(BusError::invalid_pattern(
                    pattern,
                    format!("segment '{}' contains invalid characters", segment),
                ));
            }
        }
        Ok(Self(Arc::from(pattern)))
    }

    /// The universal wildcard
    pub fn wildcard() -> Self {
        Self(Arc::from(WILDCARD))
    }

    /// The `global.eventbus.error` topic
    pub fn error_topic() -> Self {
        Self(Arc::from(HANDLER_ERROR))
    }

    /// One of the bus's own topics; these are known to be valid
    pub(crate) fn reserved(topic: &'static str) -> Self {
        debug_assert!(topic.starts_with("global.eventbus."));
        Self(Arc::from(topic))
    }

    /// Whether this is the universal wildcard
    pub fn is_wildcard(&self) -> bool {
        &*self.0 == WILDCARD
    }

    /// Whether this pattern is one of the bus's own lifecycle/error topics
    pub fn is_reserved(&self) -> bool {
        self.0.starts_with("global.eventbus.")
    }

    /// Whether a subscription on `self` receives events emitted on `emitted`
    pub fn matches(&self, emitted: &EventPattern) -> bool {
        self.is_wildcard() || self == emitted
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace segments, e.g. `["sales", "order", "created"]`
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventPattern({})", self.0)
    }
}

impl FromStr for EventPattern {
    type Err = BusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for EventPattern {
    type Error = BusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<String> for EventPattern {
    type Error = BusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&String> for EventPattern {
    type Error = BusError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Anything the bus accepts where a pattern is expected
pub trait IntoPattern {
    fn into_pattern(self) -> BusResult<EventPattern>;
}

impl IntoPattern for EventPattern {
    fn into_pattern(self) -> BusResult<EventPattern> {
        Ok(self)
    }
}

impl IntoPattern for &EventPattern {
    fn into_pattern(self) -> BusResult<EventPattern> {
        Ok(self.clone())
    }
}

impl IntoPattern for &str {
    fn into_pattern(self) -> BusResult<EventPattern> {
        EventPattern::new(self)
    }
}

impl IntoPattern for String {
    fn into_pattern(self) -> BusResult<EventPattern> {
        EventPattern::new(&self)
    }
}

impl IntoPattern for &String {
    fn into_pattern(self) -> BusResult<EventPattern> {
        EventPattern::new(self)
    }
}

impl Serialize for EventPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        EventPattern::new(&raw).map_err(serde::de::Error::custom)
    }
}
