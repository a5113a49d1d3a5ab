//! Module Descriptors
//!
//! Static declaration of a module: identity, dependencies and the
//! subscriptions that activation binds. Descriptors are plain data and can be
//! built in code or deserialized from a topology file.

use std::collections::HashSet;
use serde::{Deserialize, Serialize};
use crate::error::{BusError, BusResult};
use crate::events::{EventPattern, Priority};
use super::compatibility::BASE_DESCRIPTOR_VERSION;

/// A subscription bound when the module activates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredSubscription {
    pub pattern: String,

    /// Name resolved against the bus's handler table
    #[serde(alias = "handler")]
    pub handler_name: String,

    #[serde(default)]
    pub priority: Priority,
}

/// Module metadata and declarations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Unique module id
    pub id: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// `YYYYMMDD` descriptor format version
    #[serde(default = "default_descriptor_version")]
    pub descriptor_version: u32,

    #[serde(default)]
    pub description: String,

    /// Modules that must be active before this one
    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default, alias = "subscriptions")]
    pub event_subscriptions: Vec<DeclaredSubscription>,

    /// Patterns this module emits (informational)
    #[serde(default)]
    pub emits: Vec<String>,

    /// Opaque module configuration
    #[serde(default)]
    pub config: serde_json::Value,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

fn default_descriptor_version() -> u32 {
    BASE_DESCRIPTOR_VERSION
}

impl ModuleDescriptor {
    /// Create a descriptor targeting the current descriptor version
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            descriptor_version: BASE_DESCRIPTOR_VERSION,
            description: String::new(),
            dependencies: Vec::new(),
            event_subscriptions: Vec::new(),
            emits: Vec::new(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_version<S: Into<String>>(mut self, version: S) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_descriptor_version(mut self, descriptor_version: u32) -> Self {
        self.descriptor_version = descriptor_version;
        self
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on<S: Into<String>>(mut self, dependency: S) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Declare a subscription bound on activation
    pub fn subscribes<P: Into<String>, H: Into<String>>(mut self, pattern: P, handler_name: H, priority: Priority) -> Self {
        self.event_subscriptions.push(DeclaredSubscription {
            pattern: pattern.into(),
            handler_name: handler_name.into(),
            priority,
        });
        self
    }

    pub fn emits<P: Into<String>>(mut self, pattern: P) -> Self {
        self.emits.push(pattern.into());
        self
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Validate the descriptor in isolation
    ///
    /// Dependencies are not resolved here; they may name modules registered
    /// later and are checked when an activation is planned.
    pub fn validate(&self) -> BusResult<()> {
        if self.id.trim().is_empty() {
            return Err(BusError::invalid_descriptor(&self.id, "module id is empty"));
        }
        if self.id.chars().any(char::is_whitespace) {
            return Err(BusError::invalid_descriptor(&self.id, "module id contains whitespace"));
        }

        let mut seen = HashSet::new();
        for dependency in &self.dependencies {
            if dependency == &self.id {
                return Err(BusError::invalid_descriptor(&self.id, "module depends on itself"));
            }
            if !seen.insert(dependency.as_str()) {
                return Err(BusError::invalid_descriptor(
                    &self.id,
                    format!("dependency '{}' listed more than once", dependency),
                ));
            }
        }

        for subscription in &self.event_subscriptions {
            EventPattern::new(&subscription.pattern)?;
            if subscription.handler_name.trim().is_empty() {
                return Err(BusError::invalid_descriptor(
                    &self.id,
                    format!("subscription to '{}' has no handler name", subscription.pattern),
                ));
            }
        }
        for pattern in &self.emits {
            EventPattern::new(pattern)?;
        }
        Ok(())
    }

    /// Declared subscriptions with parsed patterns
    pub fn parsed_subscriptions(&self) -> BusResult<Vec<(EventPattern, &DeclaredSubscription)>> {
        self.event_subscriptions
            .iter()
            .map(|subscription| Ok((EventPattern::new(&subscription.pattern)?, subscription)))
            .collect()
    }
}
