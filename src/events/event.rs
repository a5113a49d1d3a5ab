//! Event Types
//!
//! An [`Event`] is created by the dispatcher for each emit and shared with
//! handlers as an `Arc<Event>`; it is dropped once dispatch completes.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use super::pattern::EventPattern;

/// An emitted event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique, time-ordered event id
    pub id: Uuid,

    /// Topic the event was emitted on
    pub pattern: EventPattern,

    /// Arbitrary structured payload
    pub payload: serde_json::Value,

    /// Emit timestamp
    pub timestamp: DateTime<Utc>,

    pub metadata: EventMetadata,
}

/// Event metadata supplied through [`EmitOptions`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Module that emitted the event, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Correlation id shared by a chain of related events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,

    /// Id of the event whose handler caused this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<Uuid>,

    /// Free-form attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Event {
    pub(crate) fn new(pattern: EventPattern, payload: serde_json::Value, options: EmitOptions) -> Self {
        Self {
            id: Uuid::now_v7(),
            pattern,
            payload,
            timestamp: Utc::now(),
            metadata: options.into_metadata(),
        }
    }

    /// Options for emitting a follow-up event caused by this one
    ///
    /// Carries the correlation id forward (or starts one from this event's id)
    /// and records this event as the cause.
    pub fn follow_up(&self) -> EmitOptions {
        EmitOptions {
            source: None,
            correlation_id: Some(self.metadata.correlation_id.unwrap_or(self.id)),
            causation_id: Some(self.id),
            attributes: BTreeMap::new(),
        }
    }

    /// Read a top-level payload field as a string
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

/// Per-emit options
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    pub source: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub causation_id: Option<Uuid>,
    pub attributes: BTreeMap<String, String>,
}

impl EmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute the event to a module (counted in its `events_emitted`)
    pub fn from_module<S: Into<String>>(mut self, module_id: S) -> Self {
        self.source = Some(module_id.into());
        self
    }

    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn with_causation_id(mut self, id: Uuid) -> Self {
        self.causation_id = Some(id);
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    fn into_metadata(self) -> EventMetadata {
        EventMetadata {
            source: self.source,
            correlation_id: self.correlation_id,
            causation_id: self.causation_id,
            attributes: self.attributes,
        }
    }
}
