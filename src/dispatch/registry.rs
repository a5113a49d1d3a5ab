//! Pattern Registry
//!
//! Stores subscriptions keyed by pattern and resolves the ordered match list
//! for an emitted pattern. Writes (subscribe/unsubscribe/unbind) take the
//! write lock; `matches` only takes the read lock and returns a snapshot, so
//! handlers never run while the registry is locked.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;
use crate::error::{BusError, BusResult};
use crate::events::{EventPattern, Priority};
use super::handler::HandlerRef;
use super::subscription::{SubscribeOptions, Subscription, SubscriptionHandle, SubscriptionId};

/// Lock-protected registry contents
#[derive(Default)]
pub(crate) struct RegistryState {
    /// Subscriptions per pattern, in registration order
    by_pattern: HashMap<EventPattern, Vec<Arc<Subscription>>>,

    /// Reverse index for O(1) pattern lookup on unsubscribe
    index: HashMap<SubscriptionId, EventPattern>,
}

impl RegistryState {
    fn insert(&mut self, subscription: Arc<Subscription>) {
        self.index.insert(subscription.id, subscription.pattern.clone());
        self.by_pattern
            .entry(subscription.pattern.clone())
            .or_default()
            .push(subscription);
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> Option<Arc<Subscription>> {
        let pattern = self.index.remove(&id)?;
        let list = self.by_pattern.get_mut(&pattern)?;
        let position = list.iter().position(|s| s.id == id)?;
        let removed = list.remove(position);
        if list.is_empty() {
            self.by_pattern.remove(&pattern);
        }
        Some(removed)
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.index.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Registry of pattern subscriptions
#[derive(Clone)]
pub struct PatternRegistry {
    state: Arc<RwLock<RegistryState>>,
    next_id: Arc<AtomicU64>,
    max_subscriptions: Option<usize>,
}

impl PatternRegistry {
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a registry that rejects subscriptions beyond `max_subscriptions`
    pub fn with_limit(max_subscriptions: Option<usize>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            next_id: Arc::new(AtomicU64::new(1)),
            max_subscriptions,
        }
    }

    /// Subscribe a handler; the returned handle unsubscribes it
    pub fn subscribe(
        &self,
        pattern: EventPattern,
        handler: HandlerRef,
        options: SubscribeOptions,
    ) -> BusResult<SubscriptionHandle> {
        let subscription = self.insert(pattern, handler, options, None)?;
        Ok(SubscriptionHandle::new(
            subscription.id,
            subscription.pattern.clone(),
            Arc::downgrade(&self.state),
        ))
    }

    /// Subscribe on behalf of a module; removed by [`PatternRegistry::remove_owned`]
    pub(crate) fn subscribe_owned(
        &self,
        pattern: EventPattern,
        handler: HandlerRef,
        priority: Priority,
        owner: &str,
    ) -> BusResult<SubscriptionId> {
        let options = SubscribeOptions::new().with_priority(priority);
        self.insert(pattern, handler, options, Some(owner.to_string()))
            .map(|subscription| subscription.id)
    }

    fn insert(
        &self,
        pattern: EventPattern,
        handler: HandlerRef,
        options: SubscribeOptions,
        owner: Option<String>,
    ) -> BusResult<Arc<Subscription>> {
        let mut state = self.state.write();

        if let Some(limit) = self.max_subscriptions {
            if state.len() >= limit {
                return Err(BusError::SubscriptionLimit { limit });
            }
        }

        let subscription = Arc::new(Subscription {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pattern,
            handler,
            priority: options.priority,
            filter: options.filter,
            owner,
        });
        debug!(
            "Subscribed '{}' to '{}' (id {}, priority {}{})",
            subscription.handler.name(),
            subscription.pattern,
            subscription.id,
            subscription.priority,
            subscription.owner.as_deref().map(|o| format!(", owner {}", o)).unwrap_or_default(),
        );
        state.insert(Arc::clone(&subscription));
        Ok(subscription)
    }

    /// Remove one subscription by id. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.state.write().remove(id).is_some();
        if removed {
            debug!("Unsubscribed subscription {}", id);
        }
        removed
    }

    /// Remove every subscription bound by `owner`; returns how many were removed
    pub(crate) fn remove_owned(&self, owner: &str) -> usize {
        let mut state = self.state.write();
        let owned: Vec<SubscriptionId> = state
            .by_pattern
            .values()
            .flatten()
            .filter(|s| s.owner.as_deref() == Some(owner))
            .map(|s| s.id)
            .collect();
        for id in &owned {
            state.remove(*id);
        }
        debug!("Unbound {} subscriptions owned by '{}'", owned.len(), owner);
        owned.len()
    }

    /// Subscriptions receiving `pattern`, ordered by tier then registration
    pub fn matches(&self, pattern: &EventPattern) -> Vec<Arc<Subscription>> {
        let state = self.state.read();
        let wildcard = EventPattern::wildcard();

        let mut matched: Vec<Arc<Subscription>> = state
            .by_pattern
            .get(pattern)
            .into_iter()
            .chain(if pattern.is_wildcard() { None } else { state.by_pattern.get(&wildcard) })
            .flatten()
            .cloned()
            .collect();
        drop(state);

        // ids are allocated in registration order
        matched.sort_by_key(|s| (s.priority, s.id));
        matched
    }

    /// Match list grouped into non-empty tiers, highest priority first
    pub fn matches_by_tier(&self, pattern: &EventPattern) -> Vec<(Priority, Vec<Arc<Subscription>>)> {
        let mut tiers: Vec<(Priority, Vec<Arc<Subscription>>)> = Vec::new();
        for subscription in self.matches(pattern) {
            match tiers.last_mut() {
                Some((priority, group)) if *priority == subscription.priority => group.push(subscription),
                _ => tiers.push((subscription.priority, vec![subscription])),
            }
        }
        tiers
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of subscriptions owned by `owner`
    pub fn owned_count(&self, owner: &str) -> usize {
        self.state
            .read()
            .by_pattern
            .values()
            .flatten()
            .filter(|s| s.owner.as_deref() == Some(owner))
            .count()
    }

    /// Sorted list of patterns with at least one subscription
    pub fn patterns(&self) -> Vec<EventPattern> {
        let mut patterns: Vec<EventPattern> = self.state.read().by_pattern.keys().cloned().collect();
        patterns.sort();
        patterns
    }
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::new()
    }
}
