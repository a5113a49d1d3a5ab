//! Stress Validation Tests
//!
//! Sustained emit load, deep module graphs and detached cascades, checked for
//! exact accounting and completion within generous time bounds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde_json::json;
use modulebus::{
    EventBus, HandlerError, HandlerFn, HandlerRef, ModuleDescriptor, Priority, SubscribeOptions,
};

fn counting(count: Arc<AtomicUsize>) -> HandlerRef {
    HandlerFn::arc("counter", move |_event| {
        let count = Arc::clone(&count);
        async move {
            count.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sustained_concurrent_emits() {
    let bus = EventBus::default();
    let count = Arc::new(AtomicUsize::new(0));
    for priority in Priority::ALL {
        bus.on_with("load.tick", counting(Arc::clone(&count)), SubscribeOptions::new().with_priority(priority))
            .unwrap();
    }

    let producers = 8;
    let per_producer = 500;
    let start = Instant::now();
    let tasks: Vec<_> = (0..producers)
        .map(|producer| {
            let bus = bus.clone();
            tokio::spawn(async move {
                for i in 0..per_producer {
                    bus.emit("load.tick", json!({ "producer": producer, "i": i })).await?;
                }
                Ok::<(), modulebus::BusError>(())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    let elapsed = start.elapsed();

    let total = producers * per_producer;
    assert_eq!(bus.metrics().total_events, total as u64);
    assert_eq!(count.load(Ordering::Relaxed), total * Priority::ALL.len());
    assert!(elapsed < Duration::from_secs(20), "{} emits took {:?}", total, elapsed);
}

#[tokio::test]
async fn test_deep_dependency_chain() {
    let bus = EventBus::default();
    let depth = 200;
    bus.register_descriptor(ModuleDescriptor::new("m0")).await.unwrap();
    for level in 1..depth {
        bus.register_descriptor(ModuleDescriptor::new(format!("m{}", level)).depends_on(format!("m{}", level - 1)))
            .await
            .unwrap();
    }

    let leaf = format!("m{}", depth - 1);
    bus.activate_module(&leaf).await.unwrap();
    let active = bus.active_modules();
    assert_eq!(active.len(), depth);
    assert_eq!(active.first().map(String::as_str), Some("m0"));
    assert_eq!(active.last(), Some(&leaf));

    bus.deactivate_module("m0").await.unwrap();
    assert!(bus.active_modules().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_detached_fan_out_settles() {
    let bus = EventBus::default();
    let leaves = Arc::new(AtomicUsize::new(0));
    let fan_out = 20;

    let weak = bus.downgrade();
    bus.on(
        "fan.root",
        HandlerFn::arc("splitter", move |event| {
            let weak = weak.clone();
            async move {
                let bus = weak.upgrade().ok_or_else(|| HandlerError::failed("bus dropped"))?;
                for branch in 0..fan_out {
                    bus.emit_detached("fan.leaf", json!({ "branch": branch }), event.follow_up())
                        .map_err(|e| HandlerError::failed(e.to_string()))?;
                }
                Ok(())
            }
        }),
    )
    .unwrap();
    bus.on("fan.leaf", counting(Arc::clone(&leaves))).unwrap();

    for _ in 0..25 {
        bus.emit("fan.root", json!({})).await.unwrap();
    }
    bus.wait_for_quiescence(Duration::from_secs(10)).await.unwrap();

    assert_eq!(leaves.load(Ordering::Relaxed), 25 * fan_out);
    assert_eq!(bus.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_subscribe_and_unsubscribe_under_load() {
    let bus = EventBus::default();
    let count = Arc::new(AtomicUsize::new(0));
    let _anchor = bus.on("churn.tick", counting(Arc::clone(&count))).unwrap();

    let emitter = {
        let bus = bus.clone();
        tokio::spawn(async move {
            for _ in 0..1000 {
                bus.emit("churn.tick", json!({})).await.unwrap();
            }
        })
    };
    let churner = {
        let bus = bus.clone();
        let count = Arc::clone(&count);
        tokio::spawn(async move {
            for _ in 0..500 {
                let handle = bus.on("churn.tick", counting(Arc::clone(&count))).unwrap();
                tokio::task::yield_now().await;
                assert!(handle.unsubscribe());
            }
        })
    };
    emitter.await.unwrap();
    churner.await.unwrap();

    assert_eq!(bus.subscriptions().len(), 1);
    assert!(count.load(Ordering::Relaxed) >= 1000);
    assert_eq!(bus.metrics().total_events, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_slow_pattern_does_not_delay_other_patterns() {
    let bus = EventBus::default();
    let slow = Arc::new(AtomicUsize::new(0));
    let fast = Arc::new(AtomicUsize::new(0));
    let slow_delay = Duration::from_millis(200);

    let slow_count = Arc::clone(&slow);
    bus.on(
        "slow.a",
        HandlerFn::arc("sleeper", move |_event| {
            let slow_count = Arc::clone(&slow_count);
            async move {
                tokio::time::sleep(slow_delay).await;
                slow_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }),
    )
    .unwrap();
    bus.on("fast.b", counting(Arc::clone(&fast))).unwrap();

    let per_pattern = 200;
    let start = Instant::now();
    let mut slow_tasks = Vec::with_capacity(per_pattern);
    let mut fast_tasks = Vec::with_capacity(per_pattern);
    for i in 0..per_pattern {
        let bus_a = bus.clone();
        slow_tasks.push(tokio::spawn(async move { bus_a.emit("slow.a", json!({ "i": i })).await }));
        let bus_b = bus.clone();
        fast_tasks.push(tokio::spawn(async move {
            let emitted = Instant::now();
            bus_b.emit("fast.b", json!({ "i": i })).await.map(|_| emitted.elapsed())
        }));
    }

    for task in fast_tasks {
        let took = task.await.unwrap().unwrap();
        assert!(took < slow_delay / 2, "fast emit waited {:?}", took);
    }
    assert_eq!(fast.load(Ordering::Relaxed), per_pattern);
    assert!(slow.load(Ordering::Relaxed) < per_pattern, "slow handlers finished first after {:?}", start.elapsed());

    for task in slow_tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(slow.load(Ordering::Relaxed), per_pattern);
    assert_eq!(bus.metrics().total_events, (2 * per_pattern) as u64);
}
