//! Bus Configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};

/// Which modules `module_health` checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthScope {
    /// Only active modules
    #[default]
    Active,

    /// Every registered module; inactive ones report `inactive`
    Registered,
}

impl FromStr for HealthScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(HealthScope::Active),
            "registered" | "all" => Ok(HealthScope::Registered),
            _ => Err(format!("Invalid health scope: {}. Valid options: active, registered", s)),
        }
    }
}

impl fmt::Display for HealthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthScope::Active => f.write_str("active"),
            HealthScope::Registered => f.write_str("registered"),
        }
    }
}

/// Event bus settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BusConfig {
    /// Per-module bound on a single health check
    pub health_check_timeout_ms: u64,

    pub health_scope: HealthScope,

    /// Default bound used by callers that shut down without an explicit timeout
    pub shutdown_timeout_ms: u64,

    /// Interval for background health monitoring; `None` disables it
    pub health_interval_ms: Option<u64>,

    /// Upper bound on live subscriptions
    pub max_subscriptions: Option<usize>,

    /// Dispatch `global.eventbus.error` for handler failures
    pub report_handler_errors: bool,

    /// Module handler error rate (percent) at which health degrades
    pub degraded_error_rate: f64,
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Health check timeout must be greater than zero")]
    InvalidHealthTimeout,

    #[error("Shutdown timeout must be greater than zero")]
    InvalidShutdownTimeout,

    #[error("Health interval must be greater than zero")]
    InvalidHealthInterval,

    #[error("Subscription limit must be greater than zero")]
    InvalidSubscriptionLimit,

    #[error("Degraded error rate must be within 0..=100, got {0}")]
    InvalidErrorRate(f64),
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            health_check_timeout_ms: 1000,
            health_scope: HealthScope::Active,
            shutdown_timeout_ms: 5000,
            health_interval_ms: None,
            max_subscriptions: None,
            report_handler_errors: true,
            degraded_error_rate: 50.0,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder { config: Self::default() }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.health_check_timeout_ms == 0 {
            return Err(ConfigError::InvalidHealthTimeout);
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::InvalidShutdownTimeout);
        }
        if self.health_interval_ms == Some(0) {
            return Err(ConfigError::InvalidHealthInterval);
        }
        if self.max_subscriptions == Some(0) {
            return Err(ConfigError::InvalidSubscriptionLimit);
        }
        if !(0.0..=100.0).contains(&self.degraded_error_rate) {
            return Err(ConfigError::InvalidErrorRate(self.degraded_error_rate));
        }
        Ok(())
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn health_interval(&self) -> Option<Duration> {
        self.health_interval_ms.map(Duration::from_millis)
    }
}

/// Builder for [`BusConfig`]
#[derive(Debug, Clone)]
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_check_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_health_scope(mut self, scope: HealthScope) -> Self {
        self.config.health_scope = scope;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.config.health_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn with_max_subscriptions(mut self, limit: usize) -> Self {
        self.config.max_subscriptions = Some(limit);
        self
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.config.report_handler_errors = enabled;
        self
    }

    pub fn with_degraded_error_rate(mut self, percent: f64) -> Self {
        self.config.degraded_error_rate = percent;
        self
    }

    pub fn build(self) -> Result<BusConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
