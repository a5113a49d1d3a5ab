//! Module Health Types

use std::collections::BTreeMap;
use std::fmt;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::monitor::ModuleMetrics;

/// Reported module status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Active,
    Degraded,
    Error,

    /// Registered but not active (only reported with the `registered` scope)
    Inactive,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Active => "active",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Error => "error",
            HealthStatus::Inactive => "inactive",
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Active)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of one module at `last_check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleHealth {
    pub status: HealthStatus,
    pub metrics: ModuleMetrics,

    /// Whether each declared dependency is active
    pub dependencies: BTreeMap<String, bool>,
    pub last_check: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModuleHealth {
    pub fn new(status: HealthStatus, metrics: ModuleMetrics, dependencies: BTreeMap<String, bool>) -> Self {
        Self {
            status,
            metrics,
            dependencies,
            last_check: Utc::now(),
            message: None,
        }
    }

    pub fn with_status(mut self, status: HealthStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_message<S: Into<String>>(mut self, message: S) -> Self {
        self.message = Some(message.into());
        self
    }

    /// An `error` report for a failed or timed-out check
    pub(crate) fn failed(mut self, message: String) -> Self {
        self.status = HealthStatus::Error;
        self.message = Some(message);
        self.last_check = Utc::now();
        self
    }

    pub fn dependencies_met(&self) -> bool {
        self.dependencies.values().all(|active| *active)
    }
}
