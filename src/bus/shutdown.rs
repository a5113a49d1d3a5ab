//! Shutdown Coordinator
//!
//! Graceful shutdown drains in-flight work, deactivates every active module
//! in one dependents-first sweep and drains again, all bounded by the
//! caller's timeout. A timeout leaves the bus consistent: whatever was torn
//! down stays torn down and the rest is still active and inspectable.

use std::time::{Duration, Instant};
use log::{error, info, warn};
use crate::error::{BusError, BusResult};
use crate::events::MODULE_DEACTIVATED;
use super::lifecycle::{ensure_outside_lifecycle, in_lifecycle};
use super::EventBus;

impl EventBus {
    /// Shut down within `timeout`
    ///
    /// Health monitors are stopped first. Errors reported by `on_deactivate`
    /// are logged; the modules are still torn down and the shutdown succeeds.
    /// Calling this from a module callback fails with
    /// [`BusError::LifecycleReentry`]. Calling it from any other handler
    /// waits on that handler's own dispatch and therefore runs into the
    /// timeout.
    pub async fn graceful_shutdown(&self, timeout: Duration) -> BusResult<()> {
        ensure_outside_lifecycle("shut down the bus")?;
        info!("Graceful shutdown started (timeout {:?})", timeout);
        self.inner.shutdown.cancel();
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.drain_and_deactivate()).await {
            Ok(()) => {
                info!("Graceful shutdown completed in {:?}", started.elapsed());
                Ok(())
            }
            Err(_) => {
                let active = self.active_modules();
                let in_flight = self.inner.in_flight.current();
                error!(
                    "Graceful shutdown timed out after {:?}: {} module(s) still active, {} operation(s) in flight",
                    timeout,
                    active.len(),
                    in_flight
                );
                Err(BusError::ShutdownTimeout { timeout, active, in_flight })
            }
        }
    }

    /// Shut down using the configured `shutdown_timeout_ms`
    pub async fn shutdown(&self) -> BusResult<()> {
        self.graceful_shutdown(self.inner.config.shutdown_timeout()).await
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Wait until no dispatch (detached or not) and no lifecycle operation is
    /// outstanding
    ///
    /// Meant for tests and tools that need a cascade of detached emits to
    /// finish; production code does not need to call it.
    pub async fn wait_for_quiescence(&self, timeout: Duration) -> BusResult<()> {
        tokio::time::timeout(timeout, self.inner.in_flight.wait_idle())
            .await
            .map_err(|_| BusError::QuiescenceTimeout {
                timeout,
                in_flight: self.inner.in_flight.current(),
            })
    }

    async fn drain_and_deactivate(&self) {
        self.inner.in_flight.wait_idle().await;

        let mut deactivated = Vec::new();
        {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let plan = {
                let modules = self.inner.modules.read();
                modules.graph().shutdown_plan(&modules.active_modules())
            };
            if !plan.is_empty() {
                info!("Deactivating {} module(s): [{}]", plan.len(), plan.join(", "));
            }
            if let Err(callback_error) = in_lifecycle(self.deactivate_all(&plan, &mut deactivated)).await {
                warn!("Shutdown continued past a deactivation error: {}", callback_error);
            }
        }

        for module_id in &deactivated {
            self.announce(MODULE_DEACTIVATED, module_id).await;
        }
        self.inner.in_flight.wait_idle().await;
    }
}
