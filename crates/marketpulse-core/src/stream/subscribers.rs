use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crate::domain::MarketObservation;

/// Callback invoked for every delivered tick.
pub type TickCallback = Arc<dyn Fn(&MarketObservation) + Send + Sync>;

/// Wraps a closure as a [`TickCallback`].
pub fn tick_callback<F>(callback: F) -> TickCallback
where
    F: Fn(&MarketObservation) + Send + Sync + 'static,
{
    Arc::new(callback)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: BTreeMap<SubscriptionId, TickCallback>,
    closed: bool,
}

/// Set of tick callbacks shared between a provider and its subscriptions.
///
/// Callbacks run outside the registry lock, so a callback may unsubscribe
/// itself or others while a tick is being delivered.
#[derive(Clone, Default)]
pub struct SubscriberSet {
    registry: Arc<Mutex<Registry>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: TickCallback) -> Subscription {
        let mut registry = self.lock();
        registry.next_id += 1;
        let id = SubscriptionId(registry.next_id);
        if registry.closed {
            tracing::debug!(subscription = id.get(), "subscribe on closed provider ignored");
        } else {
            registry.callbacks.insert(id, callback);
        }
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Delivers `observation` to every current subscriber in subscription order.
    pub fn broadcast(&self, observation: &MarketObservation) -> usize {
        let callbacks: Vec<TickCallback> = self.lock().callbacks.values().cloned().collect();
        for callback in &callbacks {
            callback(observation);
        }
        callbacks.len()
    }

    pub fn len(&self) -> usize {
        self.lock().callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every callback and refuses new ones.
    pub fn close(&self) {
        let mut registry = self.lock();
        registry.closed = true;
        registry.callbacks.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .expect("subscriber registry lock is not poisoned")
    }
}

/// Handle returned by `subscribe`; [`Subscription::unsubscribe`] removes the callback.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` when the callback was still registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry
            .lock()
            .expect("subscriber registry lock is not poisoned");
        registry.callbacks.remove(&self.id).is_some()
    }
}
