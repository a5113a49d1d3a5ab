//! Health Monitor
//!
//! Fans health checks out over the configured scope with a per-module
//! timeout. A check that fails, panics or times out yields status `error`
//! for that module only. The latest report is kept on the bus; an optional
//! background task refreshes it on an interval.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use crate::bus::{EventBus, HealthScope};
use crate::dispatch::guarded;
use crate::modules::{HealthStatus, Module, ModuleHealth, ModuleRegistry};

/// Result of one health sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub checked_at: DateTime<Utc>,
    pub modules: BTreeMap<String, ModuleHealth>,
}

impl HealthReport {
    /// Modules whose status is not `active` or `inactive`
    pub fn unhealthy(&self) -> impl Iterator<Item = (&String, &ModuleHealth)> {
        self.modules
            .iter()
            .filter(|(_, health)| matches!(health.status, HealthStatus::Degraded | HealthStatus::Error))
    }
}

/// Handle to a background health monitor
///
/// Dropping the handle detaches the task; it still stops on shutdown.
pub struct HealthMonitorHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl HealthMonitorHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop the monitor and wait for its task to exit
    pub async fn join(self) {
        self.token.cancel();
        if let Err(join_error) = self.task.await {
            warn!("Health monitor task ended abnormally: {}", join_error);
        }
    }
}

impl EventBus {
    /// Check every module in the configured scope
    pub async fn module_health(&self) -> BTreeMap<String, ModuleHealth> {
        let timeout = self.inner.config.health_check_timeout();
        let targets = self.health_targets();

        let checks = targets.into_iter().map(|(id, module, baseline)| {
            let context = self.module_context(&id, module.descriptor());
            async move {
                let fallback = baseline.clone();
                let outcome = tokio::time::timeout(timeout, guarded(module.health_check(&context, baseline))).await;
                let health = match outcome {
                    Ok(Ok(health)) => health,
                    Ok(Err(check_error)) => {
                        warn!("Health check of module '{}' failed: {}", id, check_error);
                        fallback.failed(format!("health check failed: {}", check_error))
                    }
                    Err(_) => {
                        warn!("Health check of module '{}' timed out after {:?}", id, timeout);
                        fallback.failed(format!("health check timed out after {:?}", timeout))
                    }
                };
                (id, health)
            }
        });

        let modules: BTreeMap<String, ModuleHealth> = join_all(checks).await.into_iter().collect();
        debug!("Health sweep covered {} module(s)", modules.len());

        *self.inner.latest_health.write() = Some(HealthReport {
            checked_at: Utc::now(),
            modules: modules.clone(),
        });
        modules
    }

    /// The most recent health sweep, if any
    pub fn latest_health(&self) -> Option<HealthReport> {
        self.inner.latest_health.read().clone()
    }

    /// Refresh module health every `interval` until stopped or shut down
    pub fn start_health_monitor(&self, interval: Duration) -> HealthMonitorHandle {
        let token = self.inner.shutdown.child_token();
        let stop = token.clone();
        let bus = self.downgrade();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!("Health monitor started (interval {:?})", interval);

            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(bus) = bus.upgrade() else { break };
                        bus.module_health().await;
                        if let Some(report) = bus.latest_health() {
                            for (id, health) in report.unhealthy() {
                                warn!(
                                    "Module '{}' is {}{}",
                                    id,
                                    health.status,
                                    health.message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default()
                                );
                            }
                        }
                    }
                }
            }
            debug!("Health monitor stopped");
        });

        HealthMonitorHandle { token, task }
    }

    /// Start a monitor if `health_interval_ms` is configured
    pub fn start_configured_health_monitor(&self) -> Option<HealthMonitorHandle> {
        self.inner
            .config
            .health_interval()
            .map(|interval| self.start_health_monitor(interval))
    }

    fn health_targets(&self) -> Vec<(String, Arc<dyn Module>, ModuleHealth)> {
        let modules = self.inner.modules.read();
        let ids = match self.inner.config.health_scope {
            HealthScope::Active => modules.active_modules(),
            HealthScope::Registered => modules.registered_modules(),
        };

        ids.into_iter()
            .filter_map(|id| {
                let module = modules.get(&id)?;
                let baseline = self.baseline_health(&modules, &id);
                Some((id, module, baseline))
            })
            .collect()
    }

    /// Bus-side view of a module before its own check refines it
    fn baseline_health(&self, modules: &ModuleRegistry, id: &str) -> ModuleHealth {
        let dependencies: BTreeMap<String, bool> = modules
            .descriptor(id)
            .map(|descriptor| {
                descriptor
                    .dependencies
                    .iter()
                    .map(|dependency| (dependency.clone(), modules.is_active(dependency)))
                    .collect()
            })
            .unwrap_or_default();
        let metrics = self.inner.metrics.module_snapshot(id);
        let threshold = self.inner.config.degraded_error_rate;

        let health = ModuleHealth::new(HealthStatus::Active, metrics, dependencies);
        if !modules.is_active(id) {
            health.with_status(HealthStatus::Inactive)
        } else if !health.dependencies_met() {
            health.with_status(HealthStatus::Degraded).with_message("dependency inactive")
        } else if health.metrics.handler_errors > 0 && health.metrics.error_rate >= threshold {
            let message = format!("handler error rate {:.1}%", health.metrics.error_rate);
            health.with_status(HealthStatus::Degraded).with_message(message)
        } else {
            health
        }
    }
}
