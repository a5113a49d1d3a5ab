//! Monitoring
//!
//! Bus-wide metrics and module health checks.

pub mod health;
pub mod metrics;

pub use health::{HealthMonitorHandle, HealthReport};
pub use metrics::{MetricsCollector, MetricsSnapshot, ModuleCounters, ModuleMetrics};
