//! Topology Files
//!
//! A topology is a TOML description of a module graph used to exercise a bus
//! without writing code: module descriptors with simulated behaviour,
//! scripted handlers and seed events.
//!
//! ```toml
//! [[modules]]
//! id = "inventory"
//! dependencies = ["catalog"]
//! fail_activation = false
//! health = "degraded"
//!
//! [[modules.subscriptions]]
//! pattern = "sales.order.created"
//! handler = "inventory.reserve"
//! priority = "critical"
//!
//! [[handlers]]
//! name = "inventory.reserve"
//! delay_ms = 5
//! emit = ["inventory.reserved"]
//!
//! [[events]]
//! pattern = "sales.order.created"
//! payload = { order = 42 }
//! ```
//!
//! When no `[[handlers]]` are given, every handler name a module declares is
//! registered as a handler that succeeds immediately.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use crate::bus::{EventBus, WeakEventBus};
use crate::dispatch::EventHandler;
use crate::error::{BusError, BusResult, HandlerError, HandlerResult};
use crate::events::{EmitOptions, Event, EventPattern};
use crate::modules::{
    DependencyGraph, HealthStatus, Module, ModuleContext, ModuleDescriptor, ModuleHealth, ModuleResult,
};

/// Parsed topology file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topology {
    pub modules: Vec<ModuleSpec>,
    pub handlers: Vec<HandlerSpec>,
    pub events: Vec<SeedEvent>,
}

/// A module descriptor plus simulated behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
    #[serde(flatten)]
    pub descriptor: ModuleDescriptor,

    /// Status reported by the module's own health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_message: Option<String>,

    #[serde(default)]
    pub fail_activation: bool,

    #[serde(default)]
    pub fail_deactivation: bool,
}

/// Scripted named handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSpec {
    pub name: String,

    /// Simulated processing time
    #[serde(default)]
    pub delay_ms: u64,

    /// Fail after the delay
    #[serde(default)]
    pub fail: bool,

    /// Patterns re-emitted (detached) with the incoming payload
    #[serde(default)]
    pub emit: Vec<String>,
}

impl HandlerSpec {
    fn immediate<S: Into<String>>(name: S) -> Self {
        Self { name: name.into(), delay_ms: 0, fail: false, emit: Vec::new() }
    }
}

/// Event emitted after activation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedEvent {
    pub pattern: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    /// Module the event is attributed to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Topology {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read topology file: {}", path.display()))?;
        let topology = Self::parse(&content)
            .with_context(|| format!("Failed to parse topology file: {}", path.display()))?;
        info!(
            "Loaded topology from {} ({} modules, {} seed events)",
            path.display(),
            topology.modules.len(),
            topology.events.len()
        );
        Ok(topology)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid topology TOML")
    }

    pub fn module_ids(&self) -> Vec<String> {
        self.modules.iter().map(|spec| spec.descriptor.id.clone()).collect()
    }

    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for spec in &self.modules {
            graph.add(spec.descriptor.id.clone(), spec.descriptor.dependencies.clone());
        }
        graph
    }

    /// Activation order for `target` on a bus where nothing is active yet
    pub fn activation_plan(&self, target: &str) -> BusResult<Vec<String>> {
        self.graph().activation_plan(target, &HashSet::new())
    }

    /// Handlers to register: the explicit list, or one immediate handler per
    /// declared name
    pub fn handler_specs(&self) -> Vec<HandlerSpec> {
        if !self.handlers.is_empty() {
            return self.handlers.clone();
        }
        self.declared_handler_names()
            .into_iter()
            .map(HandlerSpec::immediate)
            .collect()
    }

    fn declared_handler_names(&self) -> BTreeSet<String> {
        self.modules
            .iter()
            .flat_map(|spec| spec.descriptor.event_subscriptions.iter())
            .map(|declared| declared.handler_name.clone())
            .collect()
    }

    /// Everything that would stop a module of this topology from activating
    pub fn check(&self) -> Vec<BusError> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for spec in &self.modules {
            let descriptor = &spec.descriptor;
            if !seen.insert(descriptor.id.as_str()) {
                problems.push(BusError::duplicate_module(&descriptor.id));
            }
            if let Err(invalid) = descriptor.validate() {
                problems.push(invalid);
            }
        }

        problems.extend(self.graph().problems());

        let available: HashSet<String> = self.handler_specs().into_iter().map(|spec| spec.name).collect();
        for spec in &self.modules {
            for declared in &spec.descriptor.event_subscriptions {
                if !available.contains(&declared.handler_name) {
                    problems.push(BusError::UnresolvedHandler {
                        module: spec.descriptor.id.clone(),
                        pattern: declared.pattern.clone(),
                        handler: declared.handler_name.clone(),
                    });
                }
            }
        }

        for handler in &self.handlers {
            for pattern in &handler.emit {
                if let Err(invalid) = EventPattern::new(pattern) {
                    problems.push(invalid);
                }
            }
        }
        for event in &self.events {
            if let Err(invalid) = EventPattern::new(&event.pattern) {
                problems.push(invalid);
            }
        }

        problems
    }

    /// Register the topology's handlers and modules on `bus`
    ///
    /// Nothing is activated.
    pub async fn install(&self, bus: &EventBus) -> BusResult<()> {
        for spec in self.handler_specs() {
            let handler = SimulatedHandler::new(&spec, bus.downgrade())?;
            bus.register_handler(spec.name.clone(), Arc::new(handler));
        }
        for spec in &self.modules {
            bus.register_module(SimulatedModule::from(spec.clone())).await?;
        }
        debug!("Installed {} module(s) on the bus", self.modules.len());
        Ok(())
    }

    /// Emit every seed event in file order, waiting for each dispatch
    pub async fn emit_seed_events(&self, bus: &EventBus) -> BusResult<usize> {
        for event in &self.events {
            let mut options = EmitOptions::new();
            if let Some(source) = &event.source {
                options = options.from_module(source.as_str());
            }
            bus.emit_with(event.pattern.as_str(), event.payload.clone(), options).await?;
        }
        Ok(self.events.len())
    }
}

/// Handler driven by a [`HandlerSpec`]
pub struct SimulatedHandler {
    name: String,
    delay: Duration,
    fail: bool,
    emit: Vec<EventPattern>,
    bus: WeakEventBus,
}

impl SimulatedHandler {
    pub fn new(spec: &HandlerSpec, bus: WeakEventBus) -> BusResult<Self> {
        let emit = spec
            .emit
            .iter()
            .map(|pattern| EventPattern::new(pattern))
            .collect::<BusResult<Vec<_>>>()?;
        Ok(Self {
            name: spec.name.clone(),
            delay: Duration::from_millis(spec.delay_ms),
            fail: spec.fail,
            emit,
            bus,
        })
    }
}

#[async_trait]
impl EventHandler for SimulatedHandler {
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(HandlerError::failed(format!("simulated failure in '{}'", self.name)));
        }

        if !self.emit.is_empty() {
            let bus = self
                .bus
                .upgrade()
                .ok_or_else(|| HandlerError::failed("bus dropped"))?;
            for pattern in &self.emit {
                bus.emit_detached(pattern, event.payload.clone(), event.follow_up())
                    .map_err(|e| HandlerError::failed(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Module driven by a [`ModuleSpec`]
pub struct SimulatedModule {
    spec: ModuleSpec,
}

impl From<ModuleSpec> for SimulatedModule {
    fn from(spec: ModuleSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Module for SimulatedModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.spec.descriptor
    }

    async fn on_activate(&self, context: &ModuleContext) -> ModuleResult {
        if self.spec.fail_activation {
            return Err(HandlerError::failed(format!(
                "module '{}' is configured to fail activation",
                context.module_id()
            )));
        }
        Ok(())
    }

    async fn on_deactivate(&self, context: &ModuleContext) -> ModuleResult {
        if self.spec.fail_deactivation {
            return Err(HandlerError::failed(format!(
                "module '{}' is configured to fail deactivation",
                context.module_id()
            )));
        }
        Ok(())
    }

    async fn health_check(&self, _context: &ModuleContext, baseline: ModuleHealth) -> ModuleResult<ModuleHealth> {
        let health = match self.spec.health {
            Some(status) => baseline.with_status(status),
            None => baseline,
        };
        Ok(match &self.spec.health_message {
            Some(message) => health.with_message(message.as_str()),
            None => health,
        })
    }
}
