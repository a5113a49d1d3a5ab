//! Subscriptions
//!
//! A subscription binds a handler to a pattern with a priority tier, an
//! optional filter and, for module-bound subscriptions, an owning module.

use std::fmt;
use std::sync::{Arc, Weak};
use parking_lot::RwLock;
use crate::events::{Event, EventPattern, Priority};
use super::handler::HandlerRef;
use super::registry::RegistryState;

/// Subscription identifier, monotonically increasing per registry
pub type SubscriptionId = u64;

/// Event predicate; a `false` result silently skips the subscription
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Options accepted by `on_with`
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    pub priority: Priority,
    pub filter: Option<EventFilter>,
}

impl SubscribeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("priority", &self.priority)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// A registered subscription
pub struct Subscription {
    pub(crate) id: SubscriptionId,
    pub(crate) pattern: EventPattern,
    pub(crate) handler: HandlerRef,
    pub(crate) priority: Priority,
    pub(crate) filter: Option<EventFilter>,
    pub(crate) owner: Option<String>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &EventPattern {
        &self.pattern
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Module that bound this subscription through activation
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    /// Apply the filter, if any
    pub fn accepts(&self, event: &Event) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .field("handler", &self.handler.name())
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("owner", &self.owner)
            .finish()
    }
}

/// Unsubscribe handle returned by `on`
///
/// Dropping the handle leaves the subscription in place; call
/// [`SubscriptionHandle::unsubscribe`] to remove it. Unsubscribing is
/// idempotent and only ever removes this one subscription.
pub struct SubscriptionHandle {
    id: SubscriptionId,
    pattern: EventPattern,
    registry: Weak<RwLock<RegistryState>>,
}

impl SubscriptionHandle {
    pub(crate) fn new(id: SubscriptionId, pattern: EventPattern, registry: Weak<RwLock<RegistryState>>) -> Self {
        Self { id, pattern, registry }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn pattern(&self) -> &EventPattern {
        &self.pattern
    }

    /// Remove the subscription. Returns `true` only on the call that removed it.
    pub fn unsubscribe(&self) -> bool {
        match self.registry.upgrade() {
            Some(state) => state.write().remove(self.id).is_some(),
            None => false,
        }
    }

    /// Whether the subscription is still registered
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|state| state.read().contains(self.id))
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("pattern", &self.pattern)
            .finish()
    }
}
