//! Integration tests for graceful shutdown
//!
//! Shutdown waits for in-flight work, tears modules down dependents first
//! and reports what was left behind when it runs out of time.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use modulebus::{
    BusConfig, BusError, EmitOptions, EventBus, HandlerError, HandlerFn, Module, ModuleContext, ModuleDescriptor,
    ModuleResult, Priority,
};

/// Records its own teardown in a shared journal
struct Journaled {
    descriptor: ModuleDescriptor,
    journal: Arc<Mutex<Vec<String>>>,
    fail_teardown: bool,
}

impl Journaled {
    fn new(descriptor: ModuleDescriptor, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self { descriptor, journal, fail_teardown: false }
    }

    fn failing(mut self) -> Self {
        self.fail_teardown = true;
        self
    }
}

#[async_trait]
impl Module for Journaled {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn on_deactivate(&self, context: &ModuleContext) -> ModuleResult {
        self.journal.lock().push(context.module_id().to_string());
        if self.fail_teardown {
            Err(HandlerError::failed("flush failed"))
        } else {
            Ok(())
        }
    }
}

async fn shop(journal: &Arc<Mutex<Vec<String>>>) -> EventBus {
    let bus = EventBus::default();
    let modules = [
        ModuleDescriptor::new("catalog"),
        ModuleDescriptor::new("inventory").depends_on("catalog"),
        ModuleDescriptor::new("orders").depends_on("inventory").depends_on("catalog"),
        ModuleDescriptor::new("reports").depends_on("catalog"),
    ];
    for descriptor in modules {
        bus.register_module(Journaled::new(descriptor, Arc::clone(journal))).await.unwrap();
    }
    bus
}

#[tokio::test]
async fn test_shutdown_deactivates_dependents_first() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let bus = shop(&journal).await;
    bus.activate_module("orders").await.unwrap();
    bus.activate_module("reports").await.unwrap();

    bus.graceful_shutdown(Duration::from_secs(2)).await.unwrap();

    assert!(bus.active_modules().is_empty());
    assert!(bus.is_shutting_down());
    assert_eq!(*journal.lock(), vec!["reports", "orders", "inventory", "catalog"]);
}

#[tokio::test]
async fn test_shutdown_continues_past_failing_teardown() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let bus = EventBus::default();
    bus.register_module(Journaled::new(ModuleDescriptor::new("store"), Arc::clone(&journal)))
        .await
        .unwrap();
    bus.register_module(
        Journaled::new(ModuleDescriptor::new("cache").depends_on("store"), Arc::clone(&journal)).failing(),
    )
    .await
    .unwrap();
    bus.activate_module("cache").await.unwrap();

    bus.graceful_shutdown(Duration::from_secs(2)).await.unwrap();

    assert_eq!(*journal.lock(), vec!["cache", "store"]);
    assert!(bus.active_modules().is_empty());
    let last_error = bus.module_info("cache").unwrap().last_error.unwrap();
    assert!(last_error.contains("flush failed"));
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_dispatch() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let bus = shop(&journal).await;
    bus.activate_module("catalog").await.unwrap();

    let finished = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&finished);
    bus.on(
        "reports.rebuild",
        HandlerFn::arc("slow-rebuild", move |_event| {
            let flag = Arc::clone(&flag);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                *flag.lock() = true;
                Ok(())
            }
        }),
    )
    .unwrap();

    bus.emit_detached("reports.rebuild", json!({}), EmitOptions::new()).unwrap();
    bus.graceful_shutdown(Duration::from_secs(2)).await.unwrap();

    assert!(*finished.lock());
    assert_eq!(bus.in_flight(), 0);
    assert!(bus.active_modules().is_empty());
}

#[tokio::test]
async fn test_shutdown_timeout_reports_remaining_modules() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let bus = shop(&journal).await;
    bus.activate_module("inventory").await.unwrap();
    bus.on(
        "inventory.recount",
        HandlerFn::arc("stuck", |_event| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }),
    )
    .unwrap();

    bus.emit_detached("inventory.recount", json!({}), EmitOptions::new()).unwrap();
    let result = bus.graceful_shutdown(Duration::from_millis(50)).await;

    match result {
        Err(BusError::ShutdownTimeout { active, in_flight, .. }) => {
            assert_eq!(active, vec!["catalog", "inventory"]);
            assert!(in_flight >= 1);
        }
        other => panic!("expected shutdown timeout, got {:?}", other),
    }
    assert!(journal.lock().is_empty());
}

#[tokio::test]
async fn test_shutdown_uses_configured_timeout() {
    let config = BusConfig::builder()
        .with_shutdown_timeout(Duration::from_millis(40))
        .build()
        .unwrap();
    let bus = EventBus::new(config);
    bus.on(
        "x.y",
        HandlerFn::arc("stuck", |_event| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }),
    )
    .unwrap();

    bus.emit_detached("x.y", json!({}), EmitOptions::new()).unwrap();
    assert!(matches!(bus.shutdown().await, Err(BusError::ShutdownTimeout { .. })));
}

#[tokio::test]
async fn test_module_handlers_are_unbound_by_shutdown() {
    let journal = Arc::new(Mutex::new(Vec::new()));
    let bus = EventBus::default();
    bus.register_handler("audit.write", HandlerFn::arc("audit.write", |_event| async { Ok(()) }));
    bus.register_module(Journaled::new(
        ModuleDescriptor::new("audit").subscribes("*", "audit.write", Priority::Low),
        Arc::clone(&journal),
    ))
    .await
    .unwrap();
    bus.activate_module("audit").await.unwrap();
    assert_eq!(bus.subscriptions().owned_count("audit"), 1);

    bus.graceful_shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(bus.subscriptions().owned_count("audit"), 0);
    assert_eq!(*journal.lock(), vec!["audit"]);
}

/// Emits `setup.done` from its activation callback
struct SetupAnnouncer {
    descriptor: ModuleDescriptor,
}

#[async_trait]
impl Module for SetupAnnouncer {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    async fn on_activate(&self, context: &ModuleContext) -> ModuleResult {
        context
            .emit("setup.done", json!({}))
            .await
            .map_err(|e| HandlerError::failed(e.to_string()))
    }
}

#[tokio::test]
async fn test_shutdown_from_activation_callback_is_refused() {
    let bus = EventBus::default();
    let refused = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&refused);
    let weak = bus.downgrade();
    bus.on(
        "setup.done",
        HandlerFn::arc("early-exit", move |_event| {
            let weak = weak.clone();
            let sink = Arc::clone(&sink);
            async move {
                if let Some(bus) = weak.upgrade() {
                    let outcome = bus.graceful_shutdown(Duration::from_secs(1)).await;
                    sink.lock().push(matches!(outcome, Err(BusError::LifecycleReentry { .. })));
                }
                Ok(())
            }
        }),
    )
    .unwrap();
    bus.register_module(SetupAnnouncer { descriptor: ModuleDescriptor::new("setup") }).await.unwrap();

    let activation = tokio::time::timeout(Duration::from_secs(2), bus.activate_module("setup")).await;
    assert!(matches!(activation, Ok(Ok(()))));
    assert_eq!(*refused.lock(), vec![true]);
    assert!(!bus.is_shutting_down());

    bus.graceful_shutdown(Duration::from_secs(1)).await.unwrap();
    assert!(bus.active_modules().is_empty());
}
