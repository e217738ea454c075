// In-process Event Bus

use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::events::{AppEvent, EventBus, EventListener, Subscription, SubscriptionId};

/// Event bus backed by a listener table guarded by a lock
pub struct InMemoryEventBus {
    listeners: RwLock<HashMap<String, Vec<(SubscriptionId, EventListener)>>>,
}

impl InMemoryEventBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
        }
    }

    /// Total number of live listeners across all names
    pub fn listener_count(&self) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.values().map(Vec::len).sum()
    }

    /// Number of live listeners for one event name
    pub fn listener_count_for(&self, name: &str) -> usize {
        let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
        listeners.get(name).map(Vec::len).unwrap_or(0)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn on(&self, name: &str, listener: EventListener) -> Subscription {
        let id = Uuid::new_v4();
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        listeners
            .entry(name.to_string())
            .or_default()
            .push((id, listener));

        log::trace!("Registered listener {} for event {}", id, name);

        Subscription {
            id,
            name: name.to_string(),
        }
    }

    fn off(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(entries) = listeners.get_mut(&subscription.name) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|(id, _)| *id != subscription.id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.remove(&subscription.name);
        }

        removed
    }

    fn trigger(&self, name: &str, event: AppEvent) {
        // Release the lock before calling out, listeners may (un)subscribe
        let targets: Vec<EventListener> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            listeners
                .get(name)
                .map(|entries| entries.iter().map(|(_, l)| l.clone()).collect())
                .unwrap_or_default()
        };

        log::trace!("Triggering {} for {} listener(s)", name, targets.len());

        for listener in targets {
            listener(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_trigger_reaches_named_listeners_only() {
        let bus = InMemoryEventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        bus.on("logout", Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        bus.trigger("logout", AppEvent::Logout);
        bus.trigger("login", AppEvent::Login { site_id: None });

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_off_is_idempotent() {
        let bus = InMemoryEventBus::new();
        let subscription = bus.on("logout", Arc::new(|_| {}));
        assert_eq!(bus.listener_count(), 1);

        assert!(bus.off(&subscription));
        assert!(!bus.off(&subscription));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_listener_can_unsubscribe_during_trigger() {
        let bus = Arc::new(InMemoryEventBus::new());
        let slot: Arc<RwLock<Option<Subscription>>> = Arc::new(RwLock::new(None));

        let inner_bus = bus.clone();
        let inner_slot = slot.clone();
        let subscription = bus.on("logout", Arc::new(move |_| {
            if let Some(sub) = inner_slot.read().unwrap().as_ref() {
                inner_bus.off(sub);
            }
        }));
        *slot.write().unwrap() = Some(subscription);

        bus.trigger("logout", AppEvent::Logout);
        assert_eq!(bus.listener_count_for("logout"), 0);
    }
}
