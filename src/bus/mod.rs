//! Event Bus
//!
//! [`EventBus`] is a cheap `Clone` handle over the shared bus state: the
//! pattern registry, the named-handler table, the module registry, metrics and
//! the in-flight tracker. There is no global instance; construct one at
//! startup and pass clones to whoever needs to emit or subscribe.
//!
//! ```rust
//! use modulebus::{EventBus, HandlerFn};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::default();
//! bus.on("sales.order.created", HandlerFn::arc("audit", |event| async move {
//!     assert_eq!(event.payload["v"], 1);
//!     Ok(())
//! }))?;
//! bus.emit("sales.order.created", json!({"v": 1})).await?;
//! assert_eq!(bus.metrics().total_events, 1);
//! # Ok::<(), modulebus::BusError>(())
//! # }).unwrap();
//! ```

pub mod config;
mod lifecycle;
mod shutdown;

use std::sync::{Arc, Weak};
use log::debug;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use crate::dispatch::{
    DispatchReport, Dispatcher, HandlerRef, HandlerTable, InFlightTracker, PatternRegistry,
    SubscribeOptions, SubscriptionHandle,
};
use crate::error::BusResult;
use crate::events::{EmitOptions, Event, IntoPattern};
use crate::modules::ModuleRegistry;
use crate::monitor::health::HealthReport;
use crate::monitor::{MetricsCollector, MetricsSnapshot, ModuleMetrics};

pub use config::{BusConfig, BusConfigBuilder, ConfigError, HealthScope};

pub(crate) struct BusInner {
    pub(crate) config: BusConfig,
    pub(crate) patterns: PatternRegistry,
    pub(crate) handlers: HandlerTable,
    pub(crate) modules: RwLock<ModuleRegistry>,

    /// Serializes register/activate/deactivate/shutdown
    pub(crate) lifecycle: tokio::sync::Mutex<()>,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) in_flight: InFlightTracker,
    pub(crate) latest_health: RwLock<Option<HealthReport>>,

    /// Cancelled by shutdown; parent of every health monitor token
    pub(crate) shutdown: CancellationToken,
}

/// Module-aware event bus handle
#[derive(Clone)]
pub struct EventBus {
    pub(crate) inner: Arc<BusInner>,
}

/// Non-owning bus handle for long-lived tasks and handlers
#[derive(Clone)]
pub struct WeakEventBus {
    inner: Weak<BusInner>,
}

impl WeakEventBus {
    pub fn upgrade(&self) -> Option<EventBus> {
        self.inner.upgrade().map(|inner| EventBus { inner })
    }
}

impl EventBus {
    /// Create a bus; the configuration is used as given
    pub fn new(config: BusConfig) -> Self {
        let patterns = PatternRegistry::with_limit(config.max_subscriptions);
        let metrics = Arc::new(MetricsCollector::new());
        let in_flight = InFlightTracker::new();
        let dispatcher = Dispatcher::new(
            patterns.clone(),
            Arc::clone(&metrics),
            in_flight.clone(),
            config.report_handler_errors,
        );

        Self {
            inner: Arc::new(BusInner {
                config,
                patterns,
                handlers: HandlerTable::new(),
                modules: RwLock::new(ModuleRegistry::new()),
                lifecycle: tokio::sync::Mutex::new(()),
                dispatcher,
                metrics,
                in_flight,
                latest_health: RwLock::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Create a bus after validating `config`
    pub fn try_new(config: BusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakEventBus {
        WeakEventBus { inner: Arc::downgrade(&self.inner) }
    }

    /// Subscribe `handler` to `pattern` at the default (`low`) priority
    pub fn on<P>(&self, pattern: P, handler: HandlerRef) -> BusResult<SubscriptionHandle>
    where
        P: IntoPattern,
    {
        self.on_with(pattern, handler, SubscribeOptions::new())
    }

    pub fn on_with<P>(&self, pattern: P, handler: HandlerRef, options: SubscribeOptions) -> BusResult<SubscriptionHandle>
    where
        P: IntoPattern,
    {
        self.inner.patterns.subscribe(pattern.into_pattern()?, handler, options)
    }

    /// Emit an event and wait for every matching handler to settle
    ///
    /// Fails only for an invalid pattern. Handler failures are isolated and
    /// reported through `global.eventbus.error`. Detached emits started by
    /// handlers are not awaited; see [`EventBus::wait_for_quiescence`].
    pub async fn emit<P>(&self, pattern: P, payload: Value) -> BusResult<()>
    where
        P: IntoPattern,
    {
        self.emit_with(pattern, payload, EmitOptions::new()).await
    }

    pub async fn emit_with<P>(&self, pattern: P, payload: Value, options: EmitOptions) -> BusResult<()>
    where
        P: IntoPattern,
    {
        self.emit_report(pattern, payload, options).await.map(|_| ())
    }

    /// Like [`EventBus::emit_with`], returning the dispatch outcome
    pub async fn emit_report<P>(&self, pattern: P, payload: Value, options: EmitOptions) -> BusResult<DispatchReport>
    where
        P: IntoPattern,
    {
        let event = Arc::new(Event::new(pattern.into_pattern()?, payload, options));
        Ok(self.inner.dispatcher.dispatch(event).await)
    }

    /// Emit on a spawned task
    ///
    /// The pattern is validated immediately. The spawned dispatch counts as
    /// in flight from this call on, so quiescence and shutdown wait for it.
    /// Must be called from within a Tokio runtime.
    pub fn emit_detached<P>(&self, pattern: P, payload: Value, options: EmitOptions) -> BusResult<JoinHandle<()>>
    where
        P: IntoPattern,
    {
        let pattern = pattern.into_pattern()?;
        let tracked = self.inner.in_flight.begin();
        let bus = self.clone();
        debug!("Spawning detached emit of '{}'", pattern);

        Ok(tokio::spawn(async move {
            let _tracked = tracked;
            let event = Arc::new(Event::new(pattern, payload, options));
            bus.inner.dispatcher.dispatch(event).await;
        }))
    }

    /// Register a named handler for module subscriptions
    ///
    /// Returns the handler previously registered under `name`.
    pub fn register_handler<S: Into<String>>(&self, name: S, handler: HandlerRef) -> Option<HandlerRef> {
        self.inner.handlers.register(name, handler)
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.inner.handlers
    }

    /// Live subscriptions, including module-bound ones
    pub fn subscriptions(&self) -> &PatternRegistry {
        &self.inner.patterns
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn module_metrics(&self, module_id: &str) -> ModuleMetrics {
        self.inner.metrics.module_snapshot(module_id)
    }

    /// Dispatches and lifecycle operations not yet settled
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.current()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}
