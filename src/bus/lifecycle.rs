//! Lifecycle Manager
//!
//! Registration, dependency-ordered activation and dependents-first
//! deactivation. Every mutation runs under the bus's lifecycle lock;
//! `module-*` events are announced after the lock is released so that
//! handlers reacting to them may call back into the lifecycle API.
//!
//! Module callbacks, and handlers they reach through non-detached emits, run
//! on the task holding the lock. A lifecycle call made from there fails with
//! [`BusError::LifecycleReentry`] instead of waiting on its own lock.

use std::sync::Arc;
use log::{debug, error, info, warn};
use serde_json::json;
use crate::dispatch::{guarded, HandlerRef, PatternRegistry};
use crate::error::{BusError, BusResult};
use crate::events::{EmitOptions, Event, EventPattern, Priority, MODULE_ACTIVATED, MODULE_DEACTIVATED, MODULE_REGISTERED};
use crate::modules::{
    DescriptorModule, Module, ModuleContext, ModuleDescriptor, ModuleInfo, ModuleRegistry, ModuleState,
};
use super::EventBus;

tokio::task_local! {
    /// Set on the task running a locked lifecycle section
    static IN_LIFECYCLE: ();
}

/// Refuse `operation` when called from inside a locked lifecycle section
pub(crate) fn ensure_outside_lifecycle(operation: &'static str) -> BusResult<()> {
    if IN_LIFECYCLE.try_with(|_| ()).is_ok() {
        warn!("Refusing to {} from inside a lifecycle callback", operation);
        return Err(BusError::LifecycleReentry { operation });
    }
    Ok(())
}

/// Run `section` with the lifecycle mark set for this task
pub(crate) async fn in_lifecycle<F: std::future::Future>(section: F) -> F::Output {
    IN_LIFECYCLE.scope((), section).await
}

/// One module of an activation plan with its handlers resolved
struct ActivationStep {
    id: String,
    module: Arc<dyn Module>,
    bindings: Vec<(EventPattern, HandlerRef, Priority)>,
}

/// Unbinds a module's subscriptions on drop unless kept
///
/// Covers both a failed `on_activate` and an activation future dropped
/// mid-way, so no orphaned bindings survive either.
struct Binding<'a> {
    patterns: &'a PatternRegistry,
    module_id: &'a str,
    armed: bool,
}

impl<'a> Binding<'a> {
    fn new(patterns: &'a PatternRegistry, module_id: &'a str) -> Self {
        Self { patterns, module_id, armed: true }
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.patterns.remove_owned(self.module_id);
        }
    }
}

impl EventBus {
    /// Register a module; it starts inactive
    ///
    /// Dependencies may name modules that are registered later.
    pub async fn register_module<M: Module + 'static>(&self, module: M) -> BusResult<()> {
        self.register_shared_module(Arc::new(module)).await
    }

    /// Register a bare descriptor as a callback-free module
    pub async fn register_descriptor(&self, descriptor: ModuleDescriptor) -> BusResult<()> {
        self.register_module(DescriptorModule::new(descriptor)).await
    }

    pub async fn register_shared_module(&self, module: Arc<dyn Module>) -> BusResult<()> {
        ensure_outside_lifecycle("register a module")?;
        let _work = self.inner.in_flight.begin();
        let id = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            self.inner.modules.write().register(module)?
        };
        info!("Registered module '{}'", id);
        self.announce(MODULE_REGISTERED, &id).await;
        Ok(())
    }

    /// Activate `id` together with every inactive module it depends on
    ///
    /// The plan is validated as a whole (unknown modules, cycles, unresolved
    /// handler names) before anything is bound. Modules activated before a
    /// failing `on_activate` stay active.
    pub async fn activate_module(&self, id: &str) -> BusResult<()> {
        ensure_outside_lifecycle("activate a module")?;
        let _work = self.inner.in_flight.begin();
        let mut activated = Vec::new();
        let result = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            in_lifecycle(self.activate_locked(id, &mut activated)).await
        };

        for module_id in &activated {
            self.announce(MODULE_ACTIVATED, module_id).await;
        }
        result
    }

    /// Deactivate `id` after every active module that depends on it
    ///
    /// Deactivating an inactive module is a no-op. A failing `on_deactivate`
    /// does not stop the sweep; the first such failure is returned after all
    /// modules have been torn down.
    pub async fn deactivate_module(&self, id: &str) -> BusResult<()> {
        ensure_outside_lifecycle("deactivate a module")?;
        let _work = self.inner.in_flight.begin();
        let mut deactivated = Vec::new();
        let result = {
            let _lifecycle = self.inner.lifecycle.lock().await;
            let plan = {
                let modules = self.inner.modules.read();
                if !modules.contains(id) {
                    return Err(BusError::module_not_found(id));
                }
                modules.graph().deactivation_plan(id, &modules.active_modules())
            };
            if plan.is_empty() {
                debug!("Module '{}' is not active; nothing to deactivate", id);
            } else {
                info!("Deactivating '{}' via plan [{}]", id, plan.join(", "));
            }
            in_lifecycle(self.deactivate_all(&plan, &mut deactivated)).await
        };

        for module_id in &deactivated {
            self.announce(MODULE_DEACTIVATED, module_id).await;
        }
        result
    }

    /// Active modules in activation order
    pub fn active_modules(&self) -> Vec<String> {
        self.inner.modules.read().active_modules()
    }

    pub fn module_state(&self, id: &str) -> Option<ModuleState> {
        self.inner.modules.read().state(id)
    }

    /// Registered modules in registration order
    pub fn registered_modules(&self) -> Vec<String> {
        self.inner.modules.read().registered_modules()
    }

    pub fn module_info(&self, id: &str) -> Option<ModuleInfo> {
        self.inner.modules.read().info(id)
    }

    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner.modules.read().list()
    }

    /// Activation order for `id` without activating anything
    pub fn activation_plan(&self, id: &str) -> BusResult<Vec<String>> {
        let modules = self.inner.modules.read();
        let steps = self.plan_activation(&modules, id)?;
        Ok(steps.into_iter().map(|step| step.id).collect())
    }

    async fn activate_locked(&self, id: &str, activated: &mut Vec<String>) -> BusResult<()> {
        let plan = {
            let modules = self.inner.modules.read();
            self.plan_activation(&modules, id)?
        };

        if plan.is_empty() {
            debug!("Module '{}' is already active", id);
            return Ok(());
        }
        info!(
            "Activating '{}' via plan [{}]",
            id,
            plan.iter().map(|step| step.id.as_str()).collect::<Vec<_>>().join(", ")
        );

        for step in plan {
            let module_id = self.activate_step(step).await?;
            activated.push(module_id);
        }
        Ok(())
    }

    fn plan_activation(&self, modules: &ModuleRegistry, id: &str) -> BusResult<Vec<ActivationStep>> {
        let order = modules.graph().activation_plan(id, &modules.active_set())?;

        order
            .into_iter()
            .map(|module_id| {
                let module = modules
                    .get(&module_id)
                    .ok_or_else(|| BusError::module_not_found(&module_id))?;
                let bindings = module
                    .descriptor()
                    .parsed_subscriptions()?
                    .into_iter()
                    .map(|(pattern, declared)| {
                        let handler = self.inner.handlers.get(&declared.handler_name).ok_or_else(|| {
                            BusError::UnresolvedHandler {
                                module: module_id.clone(),
                                pattern: declared.pattern.clone(),
                                handler: declared.handler_name.clone(),
                            }
                        })?;
                        Ok((pattern, handler, declared.priority))
                    })
                    .collect::<BusResult<Vec<_>>>()?;
                Ok(ActivationStep { id: module_id, module, bindings })
            })
            .collect()
    }

    async fn activate_step(&self, step: ActivationStep) -> BusResult<String> {
        let ActivationStep { id, module, bindings } = step;
        let binding = Binding::new(&self.inner.patterns, &id);

        for (pattern, handler, priority) in bindings {
            self.inner.patterns.subscribe_owned(pattern, handler, priority, &id)?;
        }

        let context = self.module_context(&id, module.descriptor());
        match guarded(module.on_activate(&context)).await {
            Ok(()) => {
                binding.keep();
                self.inner.modules.write().mark_active(&id);
                info!(
                    "Activated module '{}' ({} subscriptions bound)",
                    id,
                    self.inner.patterns.owned_count(&id)
                );
                Ok(id)
            }
            Err(callback_error) => {
                drop(binding);
                let message = callback_error.to_string();
                error!("Activation of module '{}' failed: {}", id, message);
                self.inner.modules.write().record_error(&id, message.clone());
                Err(BusError::activation_failed(id, message))
            }
        }
    }

    /// Deactivate each module of `plan` in order, continuing past failures
    pub(crate) async fn deactivate_all(&self, plan: &[String], deactivated: &mut Vec<String>) -> BusResult<()> {
        let mut first_error = None;
        for id in plan {
            if let Err(callback_error) = self.deactivate_step(id).await {
                first_error.get_or_insert(callback_error);
            }
            deactivated.push(id.clone());
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn deactivate_step(&self, id: &str) -> BusResult<()> {
        let module = {
            let modules = self.inner.modules.read();
            match modules.get(id) {
                Some(module) => module,
                None => return Ok(()),
            }
        };

        let context = self.module_context(id, module.descriptor());
        let outcome = guarded(module.on_deactivate(&context)).await;

        let unbound = self.inner.patterns.remove_owned(id);
        self.inner.modules.write().mark_inactive(id);

        match outcome {
            Ok(()) => {
                info!("Deactivated module '{}' ({} subscriptions unbound)", id, unbound);
                Ok(())
            }
            Err(callback_error) => {
                let message = callback_error.to_string();
                warn!("Module '{}' reported an error while deactivating: {}", id, message);
                self.inner.modules.write().record_error(id, message.clone());
                Err(BusError::deactivation_failed(id, message))
            }
        }
    }

    pub(crate) fn module_context(&self, id: &str, descriptor: &ModuleDescriptor) -> ModuleContext {
        ModuleContext::new(id, descriptor.config.clone(), self.clone())
    }

    /// Dispatch a `module-*` lifecycle event
    pub(crate) async fn announce(&self, topic: &'static str, module_id: &str) {
        let event = Event::new(
            EventPattern::reserved(topic),
            json!({ "moduleId": module_id }),
            EmitOptions::new(),
        );
        self.inner.dispatcher.dispatch(Arc::new(event)).await;
    }
}
