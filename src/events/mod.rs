//! Typed publish/subscribe for sync progress and connectivity changes
//!
//! Subscribers register a callback and get back a [`Subscription`] token;
//! calling [`Subscription::unsubscribe`] removes the observer. There is no
//! event replay, late subscribers only see future events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type SubscriberMap<T> = Arc<RwLock<HashMap<u64, Callback<T>>>>;

/// Multi-subscriber event stream.
pub struct EventBus<T> {
    subscribers: SubscriberMap<T>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for EventBus<T> {
    fn clone(&self) -> Self {
        Self {
            subscribers: self.subscribers.clone(),
            next_id: self.next_id.clone(),
        }
    }
}

impl<T> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a callback invoked on every published event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().insert(id, Arc::new(callback));

        let subscribers: Weak<RwLock<HashMap<u64, Callback<T>>>> =
            Arc::downgrade(&self.subscribers);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(map) = subscribers.upgrade() {
                    map.write().remove(&id);
                }
            })),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Callbacks run on the caller's thread, outside the subscriber lock, so a
    /// callback may itself subscribe or unsubscribe.
    pub fn publish(&self, event: &T) {
        let callbacks: Vec<Callback<T>> = self.subscribers.read().values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the token leaves the observer registered; only an explicit
/// [`Subscription::unsubscribe`] removes it.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
