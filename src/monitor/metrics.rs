//! Metrics Collector
//!
//! Lock-free counters updated by the dispatcher on every dispatch attempt,
//! plus per-module counters keyed by subscription owner / event source.
//! Counters are monotonic and survive shutdown.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Bus-wide counters
#[derive(Debug, Default)]
pub struct MetricsCollector {
    total_events: AtomicU64,
    failed_dispatches: AtomicU64,
    unmatched_events: AtomicU64,
    handler_invocations: AtomicU64,
    handler_errors: AtomicU64,
    filtered_out: AtomicU64,
    total_latency_us: AtomicU64,
    modules: DashMap<String, Arc<ModuleCounters>>,
}

/// Counters for one module
#[derive(Debug, Default)]
pub struct ModuleCounters {
    events_processed: AtomicU64,
    handler_errors: AtomicU64,
    processing_time_us: AtomicU64,
    events_emitted: AtomicU64,
    in_flight: AtomicUsize,
}

impl ModuleCounters {
    /// Start timing one handler invocation
    pub(crate) fn begin_invocation(self: &Arc<Self>) -> InvocationGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InvocationGuard { counters: Arc::clone(self), started: Instant::now() }
    }

    pub fn snapshot(&self) -> ModuleMetrics {
        let processed = self.events_processed.load(Ordering::Relaxed);
        let errors = self.handler_errors.load(Ordering::Relaxed);
        let time_us = self.processing_time_us.load(Ordering::Relaxed);

        ModuleMetrics {
            events_processed: processed,
            events_emitted: self.events_emitted.load(Ordering::Relaxed),
            handler_errors: errors,
            error_rate: percentage(errors, processed),
            avg_processing_time_ms: average_ms(time_us, processed),
            queue_size: self.in_flight.load(Ordering::SeqCst),
        }
    }
}

/// Running invocation; leaves the module's queue when dropped
pub(crate) struct InvocationGuard {
    counters: Arc<ModuleCounters>,
    started: Instant,
}

impl InvocationGuard {
    pub(crate) fn finish(self, failed: bool) {
        let counters = &self.counters;
        counters.events_processed.fetch_add(1, Ordering::Relaxed);
        counters.processing_time_us.fetch_add(duration_micros(self.started.elapsed()), Ordering::Relaxed);
        if failed {
            counters.handler_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Drop for InvocationGuard {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Per-module figures reported in `ModuleHealth`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMetrics {
    pub events_processed: u64,
    pub events_emitted: u64,
    pub handler_errors: u64,

    /// Percentage of invocations that failed
    pub error_rate: f64,
    pub avg_processing_time_ms: f64,

    /// Handler invocations currently running
    pub queue_size: usize,
}

/// Read-only view of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Dispatch attempts, matched or not
    pub total_events: u64,

    /// Dispatches in which at least one handler failed
    pub failed_dispatches: u64,

    /// Dispatches that matched no subscription
    pub unmatched_events: u64,
    pub handler_invocations: u64,
    pub handler_errors: u64,

    /// Subscriptions skipped by their filter
    pub filtered_out: u64,

    /// Percentage of dispatches with at least one handler error
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed dispatch
    pub fn record_dispatch(&self, latency: Duration, matched: usize, failures: usize) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(duration_micros(latency), Ordering::Relaxed);
        if matched == 0 {
            self.unmatched_events.fetch_add(1, Ordering::Relaxed);
        }
        if failures > 0 {
            self.failed_dispatches.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_invocation(&self, failed: bool) {
        self.handler_invocations.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.handler_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_filtered(&self, skipped: usize) {
        if skipped > 0 {
            self.filtered_out.fetch_add(skipped as u64, Ordering::Relaxed);
        }
    }

    /// Count an event emitted on behalf of `module`
    pub fn record_emitted(&self, module: &str) {
        self.module(module).events_emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Counters for `module`, created on first use
    pub fn module(&self, module: &str) -> Arc<ModuleCounters> {
        if let Some(counters) = self.modules.get(module) {
            return Arc::clone(counters.value());
        }
        Arc::clone(self.modules.entry(module.to_string()).or_default().value())
    }

    pub fn module_snapshot(&self, module: &str) -> ModuleMetrics {
        self.modules
            .get(module)
            .map(|counters| counters.snapshot())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total = self.total_events.load(Ordering::Relaxed);
        let failed = self.failed_dispatches.load(Ordering::Relaxed);

        MetricsSnapshot {
            total_events: total,
            failed_dispatches: failed,
            unmatched_events: self.unmatched_events.load(Ordering::Relaxed),
            handler_invocations: self.handler_invocations.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            filtered_out: self.filtered_out.load(Ordering::Relaxed),
            error_rate: percentage(failed, total),
            avg_latency_ms: average_ms(self.total_latency_us.load(Ordering::Relaxed), total),
        }
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn average_ms(total_us: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_us as f64 / count as f64 / 1000.0
    }
}
