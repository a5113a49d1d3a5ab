//! Event Handlers
//!
//! [`EventHandler`] is the subscriber-side contract. [`HandlerFn`] adapts a
//! closure `Fn(Arc<Event>) -> Fut` so ad-hoc subscriptions need no struct.
//! [`HandlerTable`] is the process-wide named-handler table that module
//! descriptors resolve their `handler_name`s against.
//!
//! ```rust
//! use modulebus::{HandlerFn, HandlerRef};
//!
//! let h: HandlerRef = HandlerFn::arc("audit", |event| async move {
//!     println!("{} -> {}", event.pattern, event.payload);
//!     Ok(())
//! });
//! assert_eq!(h.name(), "audit");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use crate::error::HandlerResult;
use crate::events::Event;

/// Subscriber callback invoked once per matching event
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event. Errors are isolated by the dispatcher.
    async fn handle(&self, event: Arc<Event>) -> HandlerResult;

    /// Name used in logs and error reports
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Shared handler reference
pub type HandlerRef = Arc<dyn EventHandler>;

/// Closure-backed handler
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler and returns it as a shared handle
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> EventHandler for HandlerFn<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, event: Arc<Event>) -> HandlerResult {
        (self.f)(event).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Named-handler table
///
/// Populated at startup; module activation checks every declared
/// `handler_name` against it before binding anything.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: Arc<DashMap<String, HandlerRef>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named handler
    ///
    /// Returns the previously registered handler, if any. Replacing a handler
    /// does not affect subscriptions already bound with the old one.
    pub fn register<S: Into<String>>(&self, name: S, handler: HandlerRef) -> Option<HandlerRef> {
        let name = name.into();
        debug!("Registering named handler '{}'", name);
        self.handlers.insert(name, handler)
    }

    pub fn get(&self, name: &str) -> Option<HandlerRef> {
        self.handlers.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<HandlerRef> {
        self.handlers.remove(name).map(|(_, handler)| handler)
    }

    /// Sorted handler names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
