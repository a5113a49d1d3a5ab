//! Event Dispatcher
//!
//! Runs one emit to completion on the calling task:
//!
//! 1. resolve the match list from the [`PatternRegistry`], grouped by tier
//! 2. apply filters; a rejected event is a silent skip
//! 3. start every handler of a tier (its first poll) before any handler of
//!    the next tier, then drive all started handlers concurrently
//! 4. once every handler has settled, record metrics and report each failure
//!    as a `global.eventbus.error` event
//!
//! Handler errors and panics never propagate to the emitter. A failure inside
//! a handler of the error event itself is logged and counted only.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::Poll;
use std::time::{Duration, Instant};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, error, trace, warn};
use serde_json::{json, Value};
use crate::error::HandlerError;
use crate::events::{Event, EventPattern, HANDLER_ERROR};
use crate::monitor::MetricsCollector;
use super::inflight::InFlightTracker;
use super::registry::PatternRegistry;
use super::subscription::{Subscription, SubscriptionId};

/// A handler failure isolated during dispatch
#[derive(Debug, Clone)]
pub struct HandlerFailure {
    pub subscription_id: SubscriptionId,
    pub handler: String,

    /// Owning module of the failed subscription
    pub module: Option<String>,
    pub error: HandlerError,
}

/// Outcome of one dispatch
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Subscriptions whose pattern matched
    pub matched: usize,

    /// Subscriptions actually invoked (matched minus filtered)
    pub invoked: usize,
    pub filtered: usize,
    pub failures: Vec<HandlerFailure>,
    pub latency: Duration,
}

impl DispatchReport {
    fn record(&mut self, outcome: Result<(), HandlerFailure>) {
        if let Err(failure) = outcome {
            self.failures.push(failure);
        }
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Tiered, failure-isolating dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    registry: PatternRegistry,
    metrics: Arc<MetricsCollector>,
    in_flight: InFlightTracker,
    report_errors: bool,
}

impl Dispatcher {
    pub fn new(
        registry: PatternRegistry,
        metrics: Arc<MetricsCollector>,
        in_flight: InFlightTracker,
        report_errors: bool,
    ) -> Self {
        Self { registry, metrics, in_flight, report_errors }
    }

    /// Dispatch `event` and report its handler failures
    pub async fn dispatch(&self, event: Arc<Event>) -> DispatchReport {
        let report = self.run(Arc::clone(&event)).await;
        if report.succeeded() {
            return report;
        }

        if event.pattern.as_str() == HANDLER_ERROR {
            for failure in &report.failures {
                log_unreported(&event, failure);
            }
        } else if self.report_errors {
            for failure in &report.failures {
                let error_event = Arc::new(error_event(&event, failure));
                let nested = self.run(error_event).await;
                for nested_failure in &nested.failures {
                    log_unreported(&event, nested_failure);
                }
            }
        }
        report
    }

    async fn run(&self, event: Arc<Event>) -> DispatchReport {
        let _in_flight = self.in_flight.begin();
        let started = Instant::now();

        if let Some(source) = event.metadata.source.as_deref() {
            self.metrics.record_emitted(source);
        }

        let mut report = DispatchReport::default();
        let mut running = FuturesUnordered::new();

        for (priority, group) in self.registry.matches_by_tier(&event.pattern) {
            trace!("Starting {} '{}' handler(s) for '{}'", group.len(), priority, event.pattern);
            for subscription in group {
                report.matched += 1;
                if !filter_accepts(&subscription, &event) {
                    report.filtered += 1;
                    continue;
                }
                report.invoked += 1;

                let mut invocation = Box::pin(self.invoke(subscription, Arc::clone(&event)));
                match futures::poll!(invocation.as_mut()) {
                    Poll::Ready(outcome) => report.record(outcome),
                    Poll::Pending => running.push(invocation),
                }
            }
        }

        while let Some(outcome) = running.next().await {
            report.record(outcome);
        }

        report.latency = started.elapsed();
        self.metrics.record_filtered(report.filtered);
        self.metrics.record_dispatch(report.latency, report.matched, report.failures.len());

        debug!(
            "Dispatched '{}' ({}): {} matched, {} invoked, {} failed in {:?}",
            event.pattern,
            event.id,
            report.matched,
            report.invoked,
            report.failures.len(),
            report.latency
        );
        report
    }

    async fn invoke(&self, subscription: Arc<Subscription>, event: Arc<Event>) -> Result<(), HandlerFailure> {
        let timer = subscription
            .owner()
            .map(|owner| self.metrics.module(owner).begin_invocation());

        let result = guarded(subscription.handler.handle(event)).await;
        let failed = result.is_err();

        self.metrics.record_invocation(failed);
        if let Some(timer) = timer {
            timer.finish(failed);
        }

        result.map_err(|error| {
            warn!(
                "Handler '{}' (subscription {}) failed on '{}': {}",
                subscription.handler_name(),
                subscription.id(),
                subscription.pattern(),
                error
            );
            HandlerFailure {
                subscription_id: subscription.id(),
                handler: subscription.handler_name().to_string(),
                module: subscription.owner().map(str::to_string),
                error,
            }
        })
    }
}

/// Await a callback, converting a panic into [`HandlerError::Panicked`]
pub(crate) async fn guarded<T, F>(future: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::panicked(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A panicking filter rejects the event
fn filter_accepts(subscription: &Subscription, event: &Event) -> bool {
    match std::panic::catch_unwind(AssertUnwindSafe(|| subscription.accepts(event))) {
        Ok(accepted) => accepted,
        Err(panic) => {
            warn!(
                "Filter of subscription {} panicked on '{}': {}",
                subscription.id(),
                event.pattern,
                panic_message(panic.as_ref())
            );
            false
        }
    }
}

fn error_event(source: &Event, failure: &HandlerFailure) -> Event {
    let mut payload = json!({
        "pattern": source.pattern.as_str(),
        "eventId": source.id.to_string(),
        "subscriptionId": failure.subscription_id,
        "handler": failure.handler,
        "error": failure.error.to_string(),
    });
    if let (Some(module), Value::Object(fields)) = (&failure.module, &mut payload) {
        fields.insert("moduleId".to_string(), Value::String(module.clone()));
    }
    Event::new(EventPattern::error_topic(), payload, source.follow_up())
}

fn log_unreported(event: &Event, failure: &HandlerFailure) {
    error!(
        "Error-event handler '{}' (subscription {}) failed for event {}; not re-reported: {}",
        failure.handler, failure.subscription_id, event.id, failure.error
    );
}
