//! modulebus
//!
//! An in-process, module-aware event bus. Handlers subscribe to dot-separated
//! event patterns at one of four priority tiers; modules declare their
//! dependencies and subscriptions in a descriptor and are activated in
//! dependency order, health checked, and deactivated dependents-first on
//! shutdown.
//!
//! Start with [`EventBus`], [`ModuleDescriptor`] and the [`Module`] trait.

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod events;
pub mod logging;
pub mod modules;
pub mod monitor;
pub mod topology;

pub use bus::{BusConfig, BusConfigBuilder, ConfigError, EventBus, HealthScope, WeakEventBus};
pub use dispatch::{
    DispatchReport, EventFilter, EventHandler, HandlerFn, HandlerRef, SubscribeOptions, SubscriptionHandle,
};
pub use error::{BusError, BusResult, HandlerError, HandlerResult};
pub use events::{EmitOptions, Event, EventMetadata, EventPattern, IntoPattern, Priority};
pub use modules::{
    HealthStatus, Module, ModuleContext, ModuleDescriptor, ModuleHealth, ModuleInfo, ModuleResult, ModuleState,
};
pub use monitor::{HealthMonitorHandle, HealthReport, MetricsSnapshot, ModuleMetrics};
