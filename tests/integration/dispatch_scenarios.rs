//! Integration tests for event dispatch
//!
//! Delivery, priority tiers, filters, failure isolation, error reporting and
//! detached cascades through the public bus API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use parking_lot::Mutex;
use serde_json::{json, Value};
use modulebus::events::HANDLER_ERROR;
use modulebus::{
    BusError, EmitOptions, EventBus, HandlerError, HandlerFn, HandlerRef, Priority, SubscribeOptions,
};

fn counting(name: &'static str, count: Arc<AtomicUsize>) -> HandlerRef {
    HandlerFn::arc(name, move |_event| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    })
}

fn tracing(label: &'static str, order: Arc<Mutex<Vec<&'static str>>>) -> HandlerRef {
    HandlerFn::arc(label, move |_event| {
        let order = Arc::clone(&order);
        async move {
            order.lock().push(label);
            Ok(())
        }
    })
}

#[tokio::test]
async fn test_handler_invoked_once_with_payload() {
    let bus = EventBus::default();
    let payloads: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&payloads);
    bus.on(
        "x.y",
        HandlerFn::arc("H", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.payload.clone());
                Ok(())
            }
        }),
    )
    .unwrap();

    bus.emit("x.y", json!({ "v": 1 })).await.unwrap();

    assert_eq!(*payloads.lock(), vec![json!({ "v": 1 })]);
}

#[tokio::test]
async fn test_filter_selects_matching_events() {
    let bus = EventBus::default();
    let count = Arc::new(AtomicUsize::new(0));
    bus.on_with(
        "sales.order.created",
        counting("vip-desk", Arc::clone(&count)),
        SubscribeOptions::new().with_filter(|event| event.payload_str("tier") == Some("VIP")),
    )
    .unwrap();

    bus.emit("sales.order.created", json!({ "tier": "VIP" })).await.unwrap();
    bus.emit("sales.order.created", json!({ "tier": "standard" })).await.unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.metrics().filtered_out, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_emits_are_all_counted() {
    let bus = EventBus::default();
    let count = Arc::new(AtomicUsize::new(0));
    bus.on("load.tick", counting("noop", Arc::clone(&count))).unwrap();
    let before = bus.metrics().total_events;

    let emits = (0..50).map(|i| {
        let bus = bus.clone();
        tokio::spawn(async move { bus.emit("load.tick", json!({ "i": i })).await })
    });
    for result in futures::future::join_all(emits).await {
        result.unwrap().unwrap();
    }

    assert_eq!(bus.metrics().total_events - before, 50);
    assert_eq!(count.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_priority_tiers_run_in_order() {
    let bus = EventBus::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    for (label, priority) in [
        ("low", Priority::Low),
        ("critical", Priority::Critical),
        ("medium", Priority::Medium),
        ("high", Priority::High),
    ] {
        bus.on_with("x.y", tracing(label, Arc::clone(&order)), SubscribeOptions::new().with_priority(priority))
            .unwrap();
    }

    bus.emit("x.y", json!({})).await.unwrap();

    assert_eq!(*order.lock(), vec!["critical", "high", "medium", "low"]);
}

#[tokio::test]
async fn test_same_tier_keeps_subscription_order() {
    let bus = EventBus::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    bus.on("x.y", tracing("first", Arc::clone(&order))).unwrap();
    bus.on("x.y", tracing("second", Arc::clone(&order))).unwrap();
    bus.on("x.y", tracing("third", Arc::clone(&order))).unwrap();

    bus.emit("x.y", json!({})).await.unwrap();

    assert_eq!(*order.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_wildcard_receives_every_pattern() {
    let bus = EventBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    bus.on(
        "*",
        HandlerFn::arc("tap", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.pattern.to_string());
                Ok(())
            }
        }),
    )
    .unwrap();

    bus.emit("a.b", json!({})).await.unwrap();
    bus.emit("c", json!({})).await.unwrap();

    assert_eq!(*seen.lock(), vec!["a.b", "c"]);
}

#[tokio::test]
async fn test_failing_handler_is_isolated_and_reported() {
    let bus = EventBus::default();
    let survivors = Arc::new(AtomicUsize::new(0));
    let reports: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    bus.on_with(
        "payments.charge",
        HandlerFn::arc("gateway", |_event| async { Err(HandlerError::failed("card declined")) }),
        SubscribeOptions::new().with_priority(Priority::Critical),
    )
    .unwrap();
    bus.on_with(
        "payments.charge",
        HandlerFn::arc("exploder", |_event| async {
            let fuse: Option<()> = None;
            fuse.expect("exploder always panics");
            Ok(())
        }),
        SubscribeOptions::new().with_priority(Priority::High),
    )
    .unwrap();
    bus.on("payments.charge", counting("ledger", Arc::clone(&survivors))).unwrap();

    let sink = Arc::clone(&reports);
    bus.on(
        HANDLER_ERROR,
        HandlerFn::arc("error-log", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.payload.clone());
                Ok(())
            }
        }),
    )
    .unwrap();

    let report = bus
        .emit_report("payments.charge", json!({ "amount": 12 }), EmitOptions::new())
        .await
        .unwrap();

    assert_eq!(survivors.load(Ordering::SeqCst), 1);
    assert_eq!(report.matched, 3);
    assert_eq!(report.failures.len(), 2);
    assert!(!report.succeeded());

    let reports = reports.lock();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|payload| payload["pattern"] == "payments.charge"));
    assert!(reports.iter().any(|payload| payload["handler"] == "gateway"
        && payload["error"].as_str().unwrap_or_default().contains("card declined")));
    assert!(reports.iter().any(|payload| payload["handler"] == "exploder"));

    let metrics = bus.metrics();
    assert_eq!(metrics.handler_errors, 2);
    assert_eq!(metrics.failed_dispatches, 1);
}

#[tokio::test]
async fn test_failing_error_handler_does_not_recurse() {
    let bus = EventBus::default();
    let error_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&error_calls);
    bus.on("x.y", HandlerFn::arc("broken", |_event| async { Err(HandlerError::failed("boom")) }))
        .unwrap();
    bus.on(
        HANDLER_ERROR,
        HandlerFn::arc("broken-reporter", move |_event| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(HandlerError::failed("reporter also broken"))
            }
        }),
    )
    .unwrap();

    bus.emit("x.y", json!({})).await.unwrap();

    assert_eq!(error_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unsubscribe_is_idempotent_and_targeted() {
    let bus = EventBus::default();
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let handle = bus.on("x.y", counting("first", Arc::clone(&first))).unwrap();
    let _other = bus.on("x.y", counting("second", Arc::clone(&second))).unwrap();

    assert!(handle.unsubscribe());
    assert!(!handle.unsubscribe());
    assert!(!handle.is_active());

    bus.emit("x.y", json!({})).await.unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriptions().len(), 1);
}

#[tokio::test]
async fn test_unmatched_emit_is_not_an_error() {
    let bus = EventBus::default();
    bus.emit("nobody.listens", json!(null)).await.unwrap();
    assert_eq!(bus.metrics().unmatched_events, 1);
}

#[tokio::test]
async fn test_invalid_patterns_are_rejected() {
    let bus = EventBus::default();
    let count = Arc::new(AtomicUsize::new(0));

    assert!(matches!(bus.emit("", json!({})).await, Err(BusError::InvalidPattern { .. })));
    assert!(matches!(bus.emit("sales..order", json!({})).await, Err(BusError::InvalidPattern { .. })));
    assert!(matches!(
        bus.on("sales.*", counting("prefix", Arc::clone(&count))),
        Err(BusError::InvalidPattern { .. })
    ));
    assert_eq!(bus.metrics().total_events, 0);
}

#[tokio::test]
async fn test_detached_cascade_completes_before_quiescence() {
    let bus = EventBus::default();
    let delivered = Arc::new(Mutex::new(Vec::new()));

    let weak = bus.downgrade();
    bus.on(
        "sales.order.created",
        HandlerFn::arc("order-router", move |event| {
            let weak = weak.clone();
            async move {
                if let Some(bus) = weak.upgrade() {
                    bus.emit_detached("warehouse.pick", event.payload.clone(), event.follow_up())
                        .map_err(|e| HandlerError::failed(e.to_string()))?;
                }
                Ok(())
            }
        }),
    )
    .unwrap();

    let sink = Arc::clone(&delivered);
    bus.on(
        "warehouse.pick",
        HandlerFn::arc("picker", move |event| {
            let sink = Arc::clone(&sink);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                sink.lock().push((event.payload.clone(), event.metadata.causation_id));
                Ok(())
            }
        }),
    )
    .unwrap();

    bus.emit("sales.order.created", json!({ "order": 7 })).await.unwrap();
    bus.wait_for_quiescence(Duration::from_secs(2)).await.unwrap();

    let delivered = delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, json!({ "order": 7 }));
    assert!(delivered[0].1.is_some());
    assert_eq!(bus.in_flight(), 0);
}

#[tokio::test]
async fn test_subscription_limit() {
    let bus = EventBus::new(modulebus::BusConfig::builder().with_max_subscriptions(1).build().unwrap());
    let count = Arc::new(AtomicUsize::new(0));
    bus.on("x.y", counting("one", Arc::clone(&count))).unwrap();
    assert!(matches!(
        bus.on("x.y", counting("two", Arc::clone(&count))),
        Err(BusError::SubscriptionLimit { limit: 1 })
    ));
}
