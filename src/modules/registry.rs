//! Module Registry
//!
//! Registered modules with their activation state. The bus keeps the registry
//! behind a `parking_lot::RwLock`; mutations happen only while the lifecycle
//! lock is held, so readers always see a state consistent with completed
//! activate/deactivate calls.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::{BusError, BusResult};
use super::compatibility::CompatibilityChecker;
use super::descriptor::ModuleDescriptor;
use super::graph::DependencyGraph;
use super::module::Module;

/// Activation state of a registered module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Inactive,
    Active,
}

impl ModuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleState::Inactive => "inactive",
            ModuleState::Active => "active",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct ModuleEntry {
    module: Arc<dyn Module>,
    state: ModuleState,
    activated_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Summary of one registered module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub id: String,
    pub version: String,
    pub state: ModuleState,
    pub dependencies: Vec<String>,
    pub subscriptions: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub activated_at: Option<DateTime<Utc>>,

    /// Most recent lifecycle callback failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Registry of modules
#[derive(Default)]
pub struct ModuleRegistry {
    entries: HashMap<String, ModuleEntry>,
    registration_order: Vec<String>,
    activation_order: Vec<String>,
    compatibility: CompatibilityChecker,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a module as inactive
    pub fn register(&mut self, module: Arc<dyn Module>) -> BusResult<String> {
        let descriptor = module.descriptor();
        descriptor.validate()?;
        self.compatibility.check(descriptor)?;

        if self.entries.contains_key(&descriptor.id) {
            return Err(BusError::duplicate_module(&descriptor.id));
        }

        let id = descriptor.id.clone();
        debug!("Registered module '{}' v{}", id, descriptor.version);
        self.registration_order.push(id.clone());
        self.entries.insert(
            id.clone(),
            ModuleEntry {
                module,
                state: ModuleState::Inactive,
                activated_at: None,
                last_error: None,
            },
        );
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Module>> {
        self.entries.get(id).map(|entry| Arc::clone(&entry.module))
    }

    pub fn descriptor(&self, id: &str) -> Option<&ModuleDescriptor> {
        self.entries.get(id).map(|entry| entry.module.descriptor())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn state(&self, id: &str) -> Option<ModuleState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.state(id) == Some(ModuleState::Active)
    }

    pub(crate) fn mark_active(&mut self, id: &str) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = ModuleState::Active;
            entry.activated_at = Some(Utc::now());
            entry.last_error = None;
            if !self.activation_order.iter().any(|m| m == id) {
                self.activation_order.push(id.to_string());
            }
        }
    }

    pub(crate) fn mark_inactive(&mut self, id: &str) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.state = ModuleState::Inactive;
            entry.activated_at = None;
        }
        self.activation_order.retain(|m| m != id);
    }

    pub(crate) fn record_error(&mut self, id: &str, message: String) {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_error = Some(message);
        }
    }

    /// Active modules in activation order
    pub fn active_modules(&self) -> Vec<String> {
        self.activation_order.clone()
    }

    pub fn active_set(&self) -> HashSet<String> {
        self.activation_order.iter().cloned().collect()
    }

    /// All modules in registration order
    pub fn registered_modules(&self) -> Vec<String> {
        self.registration_order.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of declared dependencies
    pub fn graph(&self) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for id in &self.registration_order {
            if let Some(descriptor) = self.descriptor(id) {
                graph.add(id.as_str(), descriptor.dependencies.clone());
            }
        }
        graph
    }

    pub fn info(&self, id: &str) -> Option<ModuleInfo> {
        self.entries.get(id).map(|entry| {
            let descriptor = entry.module.descriptor();
            ModuleInfo {
                id: descriptor.id.clone(),
                version: descriptor.version.clone(),
                state: entry.state,
                dependencies: descriptor.dependencies.clone(),
                subscriptions: descriptor.event_subscriptions.len(),
                activated_at: entry.activated_at,
                last_error: entry.last_error.clone(),
            }
        })
    }

    /// Info for every module in registration order
    pub fn list(&self) -> Vec<ModuleInfo> {
        self.registration_order.iter().filter_map(|id| self.info(id)).collect()
    }
}
