//! Module Trait
//!
//! A module supplies its [`ModuleDescriptor`] and optional lifecycle
//! callbacks. Every callback has a no-op (or healthy) default, so a module
//! that only declares subscriptions can be registered as a
//! [`DescriptorModule`].

use async_trait::async_trait;
use serde_json::Value;
use crate::bus::EventBus;
use crate::error::{BusResult, HandlerError};
use crate::events::{EmitOptions, IntoPattern};
use super::descriptor::ModuleDescriptor;
use super::health::ModuleHealth;

/// Result of a module lifecycle callback
pub type ModuleResult<T = ()> = Result<T, HandlerError>;

/// A unit activated and deactivated as a whole
#[async_trait]
pub trait Module: Send + Sync {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Called after the module's declared subscriptions are bound
    ///
    /// An error leaves the module inactive and unbinds its subscriptions.
    async fn on_activate(&self, _context: &ModuleContext) -> ModuleResult {
        Ok(())
    }

    /// Called before the module's subscriptions are unbound
    ///
    /// The module is torn down even if this returns an error.
    async fn on_deactivate(&self, _context: &ModuleContext) -> ModuleResult {
        Ok(())
    }

    /// Refine the bus-computed `baseline` report
    async fn health_check(&self, _context: &ModuleContext, baseline: ModuleHealth) -> ModuleResult<ModuleHealth> {
        Ok(baseline)
    }
}

/// Module without callbacks
#[derive(Debug, Clone)]
pub struct DescriptorModule {
    descriptor: ModuleDescriptor,
}

impl DescriptorModule {
    pub fn new(descriptor: ModuleDescriptor) -> Self {
        Self { descriptor }
    }
}

impl From<ModuleDescriptor> for DescriptorModule {
    fn from(descriptor: ModuleDescriptor) -> Self {
        Self::new(descriptor)
    }
}

#[async_trait]
impl Module for DescriptorModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }
}

/// Handed to module callbacks
///
/// Events emitted through the context are attributed to the module and
/// counted in its `events_emitted`.
#[derive(Clone)]
pub struct ModuleContext {
    module_id: String,
    config: Value,
    bus: EventBus,
}

impl ModuleContext {
    pub(crate) fn new(module_id: &str, config: Value, bus: EventBus) -> Self {
        Self {
            module_id: module_id.to_string(),
            config,
            bus,
        }
    }

    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// The descriptor's `config` value
    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

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
        self.bus
            .emit_with(pattern, payload, options.from_module(self.module_id.as_str()))
            .await
    }
}
