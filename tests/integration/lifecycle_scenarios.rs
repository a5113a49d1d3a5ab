//! Integration tests for module lifecycle
//!
//! Registration, dependency-ordered activation, dependents-first
//! deactivation and the lifecycle events observed from outside the bus.

use std::sync::Arc;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use modulebus::events::{MODULE_ACTIVATED, MODULE_DEACTIVATED, MODULE_REGISTERED};
use modulebus::{
    BusError, EventBus, HandlerError, HandlerFn, HandlerRef, HealthStatus, Module, ModuleContext,
    ModuleDescriptor, ModuleHealth, ModuleResult, ModuleState, Priority,
};

fn recorder(seen: Arc<Mutex<Vec<String>>>) -> HandlerRef {
    HandlerFn::arc("recorder", move |event| {
        let seen = Arc::clone(&seen);
        async move {
            let module = event.payload_str("moduleId").unwrap_or("?").to_string();
            seen.lock().push(format!("{}:{}", event.pattern, module));
            Ok(())
        }
    })
}

fn noop() -> HandlerRef {
    HandlerFn::arc("noop", |_event| async { Ok(()) })
}

/// Module that stocks a warehouse on activation and reports the stock level
struct Warehouse {
    descriptor: ModuleDescriptor,
    stock: Arc<Mutex<u32>>,
}

impl Warehouse {
    fn new(stock: Arc<Mutex<u32>>) -> Self {
        let descriptor = ModuleDescriptor::new("warehouse")
            .with_version("2.1.0")
            .depends_on("catalog")
            .subscribes("sales.order.created", "warehouse.pick", Priority::High)
            .emits("warehouse.stocked");
        Self { descriptor, stock }
    }
}

#[async_trait]
impl Module for Warehouse {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn on_activate(&self, context: &ModuleContext) -> ModuleResult {
        *self.stock.lock() = 10;
        context
            .emit("warehouse.stocked", json!({ "units": 10 }))
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))
    }

    async fn on_deactivate(&self, _context: &ModuleContext) -> ModuleResult {
        *self.stock.lock() = 0;
        Ok(())
    }

    async fn health_check(&self, _context: &ModuleContext, baseline: ModuleHealth) -> ModuleResult<ModuleHealth> {
        if *self.stock.lock() < 5 {
            Ok(baseline.with_status(HealthStatus::Degraded).with_message("low stock"))
        } else {
            Ok(baseline)
        }
    }
}

#[tokio::test]
async fn test_activating_dependent_activates_dependency_first() {
    let bus = EventBus::default();
    bus.register_descriptor(ModuleDescriptor::new("A")).await.unwrap();
    bus.register_descriptor(ModuleDescriptor::new("B").depends_on("A")).await.unwrap();

    tokio_test::assert_ok!(bus.activate_module("B").await);

    assert_eq!(bus.active_modules(), vec!["A", "B"]);
    assert_eq!(bus.module_state("A"), Some(ModuleState::Active));
    assert_eq!(bus.module_state("B"), Some(ModuleState::Active));
}

#[tokio::test]
async fn test_lifecycle_events_observed_in_order() {
    let bus = EventBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for topic in [MODULE_REGISTERED, MODULE_ACTIVATED, MODULE_DEACTIVATED] {
        bus.on(topic, recorder(Arc::clone(&seen))).unwrap();
    }

    bus.register_descriptor(ModuleDescriptor::new("catalog")).await.unwrap();
    bus.register_descriptor(ModuleDescriptor::new("orders").depends_on("catalog")).await.unwrap();
    bus.activate_module("orders").await.unwrap();
    bus.deactivate_module("catalog").await.unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "global.eventbus.module-registered:catalog",
            "global.eventbus.module-registered:orders",
            "global.eventbus.module-activated:catalog",
            "global.eventbus.module-activated:orders",
            "global.eventbus.module-deactivated:orders",
            "global.eventbus.module-deactivated:catalog",
        ]
    );
    assert!(bus.active_modules().is_empty());
}

#[tokio::test]
async fn test_module_callbacks_and_health() {
    let bus = EventBus::default();
    let stock = Arc::new(Mutex::new(0));
    let stocked: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stocked);
    bus.on(
        "warehouse.stocked",
        HandlerFn::arc("stock-watcher", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                assert_eq!(event.metadata.source.as_deref(), Some("warehouse"));
                sink.lock().push(event.payload.clone());
                Ok(())
            }
        }),
    )
    .unwrap();
    bus.register_handler("warehouse.pick", noop());
    bus.register_descriptor(ModuleDescriptor::new("catalog")).await.unwrap();
    bus.register_module(Warehouse::new(Arc::clone(&stock))).await.unwrap();

    bus.activate_module("warehouse").await.unwrap();
    assert_eq!(*stocked.lock(), vec![json!({ "units": 10 })]);
    assert_eq!(bus.module_metrics("warehouse").events_emitted, 1);

    let health = bus.module_health().await;
    assert_eq!(health["warehouse"].status, HealthStatus::Active);
    assert_eq!(health["warehouse"].dependencies.get("catalog"), Some(&true));

    *stock.lock() = 2;
    let health = bus.module_health().await;
    assert_eq!(health["warehouse"].status, HealthStatus::Degraded);
    assert_eq!(health["warehouse"].message.as_deref(), Some("low stock"));

    bus.deactivate_module("warehouse").await.unwrap();
    assert_eq!(*stock.lock(), 0);
    assert_eq!(bus.subscriptions().owned_count("warehouse"), 0);
    assert_eq!(bus.module_state("catalog"), Some(ModuleState::Active));
}

#[tokio::test]
async fn test_module_subscriptions_follow_activation() {
    let bus = EventBus::default();
    let picked = Arc::new(Mutex::new(0u32));
    let counter = Arc::clone(&picked);
    bus.register_handler(
        "warehouse.pick",
        HandlerFn::arc("warehouse.pick", move |_event| {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock() += 1;
                Ok(())
            }
        }),
    );
    bus.register_descriptor(ModuleDescriptor::new("catalog")).await.unwrap();
    bus.register_module(Warehouse::new(Arc::new(Mutex::new(0)))).await.unwrap();

    bus.emit("sales.order.created", json!({})).await.unwrap();
    assert_eq!(*picked.lock(), 0);

    bus.activate_module("warehouse").await.unwrap();
    bus.emit("sales.order.created", json!({})).await.unwrap();
    assert_eq!(*picked.lock(), 1);

    bus.deactivate_module("warehouse").await.unwrap();
    bus.emit("sales.order.created", json!({})).await.unwrap();
    assert_eq!(*picked.lock(), 1);
}

#[tokio::test]
async fn test_configuration_errors_leave_bus_untouched() {
    let bus = EventBus::default();
    bus.register_descriptor(ModuleDescriptor::new("orphan").depends_on("ghost")).await.unwrap();
    bus.register_descriptor(
        ModuleDescriptor::new("needs-handler").subscribes("x.y", "not-registered", Priority::Medium),
    )
    .await
    .unwrap();

    assert!(matches!(
        bus.activate_module("orphan").await,
        Err(BusError::UnknownDependency { ref dependency, .. }) if dependency == "ghost"
    ));
    assert!(matches!(
        bus.activate_module("needs-handler").await,
        Err(BusError::UnresolvedHandler { ref handler, .. }) if handler == "not-registered"
    ));
    tokio_test::assert_err!(bus.activate_module("nobody").await);
    assert!(matches!(
        bus.register_descriptor(ModuleDescriptor::new("orphan")).await,
        Err(BusError::DuplicateModule { .. })
    ));

    assert!(bus.active_modules().is_empty());
    assert!(bus.subscriptions().is_empty());
}

#[tokio::test]
async fn test_registration_rejects_invalid_descriptor() {
    let bus = EventBus::default();
    let result = bus
        .register_descriptor(ModuleDescriptor::new("bad").subscribes("sales..created", "noop", Priority::Low))
        .await;
    assert!(result.is_err());
    assert!(bus.registered_modules().is_empty());
}

#[tokio::test]
async fn test_module_listing() {
    let bus = EventBus::default();
    bus.register_handler("warehouse.pick", noop());
    bus.register_descriptor(ModuleDescriptor::new("catalog").with_version("1.0.0")).await.unwrap();
    bus.register_module(Warehouse::new(Arc::new(Mutex::new(0)))).await.unwrap();
    bus.activate_module("warehouse").await.unwrap();

    let modules = bus.modules();
    assert_eq!(modules.len(), 2);
    let warehouse = modules.iter().find(|info| info.id == "warehouse").unwrap();
    assert_eq!(warehouse.version, "2.1.0");
    assert_eq!(warehouse.dependencies, vec!["catalog"]);
    assert_eq!(warehouse.subscriptions, 1);
    assert!(warehouse.activated_at.is_some());
    assert_eq!(bus.activation_plan("warehouse").unwrap(), Vec::<String>::new());
}
