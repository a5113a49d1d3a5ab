//! Modules
//!
//! Descriptors, the [`Module`] trait, the module registry and dependency
//! planning. The lifecycle operations themselves live on
//! [`EventBus`](crate::EventBus).

pub mod compatibility;
pub mod descriptor;
pub mod graph;
pub mod health;
pub mod module;
pub mod registry;

#[cfg(test)]
mod tests;

pub use compatibility::{descriptor_version, CompatibilityChecker, BASE_DESCRIPTOR_VERSION};
pub use descriptor::{DeclaredSubscription, ModuleDescriptor};
pub use graph::DependencyGraph;
pub use health::{HealthStatus, ModuleHealth};
pub use module::{DescriptorModule, Module, ModuleContext, ModuleResult};
pub use registry::{ModuleInfo, ModuleRegistry, ModuleState};
