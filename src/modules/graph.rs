//! Module Dependency Graph
//!
//! Pure planning over a snapshot of declared dependencies. Nothing here
//! touches module state; the lifecycle manager executes the plans.

use std::collections::{HashMap, HashSet};
use crate::error::{BusError, BusResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Declared dependencies of every registered module
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependencies: HashMap<String, Vec<String>>,

    /// Registration order, for deterministic full-graph traversal
    order: Vec<String>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: Into<String>>(&mut self, module: S, dependencies: Vec<String>) {
        let module = module.into();
        if !self.dependencies.contains_key(&module) {
            self.order.push(module.clone());
        }
        self.dependencies.insert(module, dependencies);
    }

    pub fn contains(&self, module: &str) -> bool {
        self.dependencies.contains_key(module)
    }

    pub fn dependencies(&self, module: &str) -> &[String] {
        self.dependencies.get(module).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn modules(&self) -> &[String] {
        &self.order
    }

    /// Modules to activate, dependencies first, so that `target` becomes active
    ///
    /// Modules in `active` are already satisfied and are skipped along with
    /// their own dependencies. The plan is empty when `target` is active.
    pub fn activation_plan(&self, target: &str, active: &HashSet<String>) -> BusResult<Vec<String>> {
        if !self.contains(target) {
            return Err(BusError::module_not_found(target));
        }
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        let mut plan = Vec::new();
        self.visit(target, active, &mut marks, &mut path, &mut plan)?;
        Ok(plan)
    }

    /// Every module in dependency order (registration order breaks ties)
    pub fn topological_order(&self) -> BusResult<Vec<String>> {
        let active = HashSet::new();
        let mut marks = HashMap::new();
        let mut plan = Vec::new();
        for module in &self.order {
            let mut path = Vec::new();
            self.visit(module, &active, &mut marks, &mut path, &mut plan)?;
        }
        Ok(plan)
    }

    /// Every unknown dependency and the first cycle, if any
    pub fn problems(&self) -> Vec<BusError> {
        let mut problems: Vec<BusError> = self
            .order
            .iter()
            .flat_map(|module| {
                self.dependencies(module)
                    .iter()
                    .filter(|dependency| !self.contains(dependency))
                    .map(move |dependency| BusError::unknown_dependency(module, dependency))
            })
            .collect();

        if problems.is_empty() {
            if let Err(cycle) = self.topological_order() {
                problems.push(cycle);
            }
        }
        problems
    }

    fn visit(
        &self,
        module: &str,
        active: &HashSet<String>,
        marks: &mut HashMap<String, Mark>,
        path: &mut Vec<String>,
        plan: &mut Vec<String>,
    ) -> BusResult<()> {
        if active.contains(module) {
            return Ok(());
        }
        match marks.get(module) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|m| m == module).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(module.to_string());
                return Err(BusError::dependency_cycle(cycle));
            }
            None => {}
        }

        marks.insert(module.to_string(), Mark::Visiting);
        path.push(module.to_string());

        for dependency in self.dependencies(module) {
            if !self.contains(dependency) {
                return Err(BusError::unknown_dependency(module, dependency));
            }
            self.visit(dependency, active, marks, path, plan)?;
        }

        path.pop();
        marks.insert(module.to_string(), Mark::Done);
        plan.push(module.to_string());
        Ok(())
    }

    /// Active modules to deactivate, dependents first, so that `target` can go
    ///
    /// `active_order` lists active modules in activation order; the plan is
    /// empty when `target` is not among them.
    pub fn deactivation_plan(&self, target: &str, active_order: &[String]) -> Vec<String> {
        let mut plan = Vec::new();
        if active_order.iter().any(|m| m == target) {
            let mut visited = HashSet::new();
            self.visit_dependents(target, active_order, &mut visited, &mut plan);
        }
        plan
    }

    /// Every active module, dependents first
    pub fn shutdown_plan(&self, active_order: &[String]) -> Vec<String> {
        let mut plan = Vec::new();
        let mut visited = HashSet::new();
        for module in active_order.iter().rev() {
            self.visit_dependents(module, active_order, &mut visited, &mut plan);
        }
        plan
    }

    fn visit_dependents(
        &self,
        module: &str,
        active_order: &[String],
        visited: &mut HashSet<String>,
        plan: &mut Vec<String>,
    ) {
        if !visited.insert(module.to_string()) {
            return;
        }
        // Latest-activated dependents go first
        for dependent in active_order.iter().rev() {
            if self.dependencies(dependent).iter().any(|d| d == module) {
                self.visit_dependents(dependent, active_order, visited, plan);
            }
        }
        plan.push(module.to_string());
    }
}
