//! Publish/subscribe channel for container change events.
//!
//! A bus is an explicit value: containers and sessions that should see each
//! other are built on clones of the same bus. Delivery is synchronous, on the
//! publishing thread, in subscriber registration order.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::observable::IdentityToken;

/// Topic published by every observable container mutation.
pub const CONTAINER_CHANGED: &str = "container.changed";

/// Handle returned by [`NotificationBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Bus handler function type.
pub type BusHandler = Arc<dyn Fn(&IdentityToken) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    topic: String,
    handler: BusHandler,
}

#[derive(Default)]
struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

#[derive(Clone, Default)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a topic.
    pub fn subscribe<F>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&IdentityToken) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.lock().push(Subscriber {
            id,
            topic: topic.to_string(),
            handler: Arc::new(handler),
        });
        debug!(topic, subscription = id.0, "Bus subscription added");
        id
    }

    /// Remove a subscription. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.inner.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        before != subscribers.len()
    }

    pub fn has_subscribers(&self, topic: &str) -> bool {
        self.inner.subscribers.lock().iter().any(|s| s.topic == topic)
    }

    /// Deliver `token` to every handler of `topic`, returning how many ran.
    ///
    /// Publishing with nobody subscribed is a no-op. Handlers run after the
    /// subscriber list is released, so a handler may itself (un)subscribe.
    pub fn publish(&self, topic: &str, token: &IdentityToken) -> usize {
        let handlers: Vec<BusHandler> = self
            .inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| s.topic == topic)
            .map(|s| s.handler.clone())
            .collect();

        trace!(topic, %token, handlers = handlers.len(), "Bus publish");
        for handler in &handlers {
            handler(token);
        }
        handlers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let bus = NotificationBus::new();
        assert_eq!(bus.publish(CONTAINER_CHANGED, &IdentityToken::new()), 0);
        assert!(!bus.has_subscribers(CONTAINER_CHANGED));
    }

    #[test]
    fn test_delivery_in_registration_order() {
        let bus = NotificationBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(CONTAINER_CHANGED, move |_| log.lock().push(name));
        }
        let log_other = log.clone();
        bus.subscribe("other.topic", move |_| log_other.lock().push("other"));

        assert_eq!(bus.publish(CONTAINER_CHANGED, &IdentityToken::new()), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_same_token_delivered_in_issue_order() {
        let bus = NotificationBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        bus.subscribe(CONTAINER_CHANGED, move |t| seen_clone.lock().push(t.clone()));

        let a = IdentityToken::new();
        let b = IdentityToken::new();
        bus.publish(CONTAINER_CHANGED, &a);
        bus.publish(CONTAINER_CHANGED, &b);
        bus.publish(CONTAINER_CHANGED, &a);

        assert_eq!(*seen.lock(), vec![a.clone(), b, a]);
    }

    #[test]
    fn test_unsubscribe() {
        let bus = NotificationBus::new();
        let id = bus.subscribe(CONTAINER_CHANGED, |_| {});
        assert!(bus.has_subscribers(CONTAINER_CHANGED));
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.publish(CONTAINER_CHANGED, &IdentityToken::new()), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = NotificationBus::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let bus_clone = bus.clone();
        let slot_clone = slot.clone();
        let id = bus.subscribe(CONTAINER_CHANGED, move |_| {
            if let Some(id) = slot_clone.lock().take() {
                bus_clone.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        assert_eq!(bus.publish(CONTAINER_CHANGED, &IdentityToken::new()), 1);
        assert_eq!(bus.publish(CONTAINER_CHANGED, &IdentityToken::new()), 0);
    }
}
