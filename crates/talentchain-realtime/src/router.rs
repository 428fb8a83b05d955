//! Event routing from event types to subscriber callbacks.

use crate::event::{RealtimeEvent, WILDCARD};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the broadcast channel.
const BROADCAST_CAPACITY: usize = 1024;

/// Subscriber callback.
pub type Callback = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

/// Identifies one registration.
type ListenerId = u64;

/// Routes dispatched events to the callbacks registered for their type.
///
/// Cloning yields another handle to the same registrations.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    /// Registrations keyed by event type, each in registration order.
    listeners: Mutex<Listeners>,
    /// Broadcast channel for async consumers.
    event_tx: broadcast::Sender<RealtimeEvent>,
    /// Statistics.
    stats: RwLock<RouterStats>,
}

#[derive(Default)]
struct Listeners {
    next_id: ListenerId,
    by_type: HashMap<String, Vec<Listener>>,
}

struct Listener {
    id: ListenerId,
    callback: Callback,
}

impl EventRouter {
    /// Create a router with no registrations.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(RouterInner {
                listeners: Mutex::new(Listeners::default()),
                event_tx,
                stats: RwLock::new(RouterStats::default()),
            }),
        }
    }

    /// Register `callback` for `event_type`, or for every type with [`WILDCARD`].
    ///
    /// Every call creates an independent registration, even for the same
    /// callback and type. The returned [`Subscription`] removes exactly this
    /// one.
    pub fn subscribe<F>(&self, event_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        let mut listeners = self.inner.listeners.lock();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners
            .by_type
            .entry(event_type.clone())
            .or_default()
            .push(Listener {
                id,
                callback: Arc::new(callback),
            });
        drop(listeners);

        debug!(event_type = %event_type, listener = id, "Listener registered");

        Subscription {
            event_type,
            id,
            router: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `event` to its type's callbacks, then to wildcard callbacks.
    ///
    /// Callbacks run on a snapshot taken before the first one is called, so
    /// they may subscribe or unsubscribe freely. A panicking callback is
    /// logged and skipped; it never reaches the caller.
    pub fn dispatch(&self, event: &RealtimeEvent) {
        let snapshot: Vec<Callback> = {
            let listeners = self.inner.listeners.lock();
            let typed = if event.event_type == WILDCARD {
                None
            } else {
                listeners.by_type.get(&event.event_type)
            };
            let wildcard = listeners.by_type.get(WILDCARD);

            typed
                .into_iter()
                .flatten()
                .chain(wildcard.into_iter().flatten())
                .map(|listener| listener.callback.clone())
                .collect()
        };

        let mut panics = 0;
        for callback in &snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                panics += 1;
                warn!(
                    event_type = %event.event_type,
                    panic = %panic_message(payload.as_ref()),
                    "Listener panicked during dispatch"
                );
            }
        }

        let _ = self.inner.event_tx.send(event.clone());

        let mut stats = self.inner.stats.write();
        stats.events_dispatched += 1;
        stats.callbacks_invoked += snapshot.len() as u64;
        stats.callback_panics += panics;
    }

    /// Subscribe to every dispatched event as an async stream.
    pub fn events(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Number of registrations for `event_type`.
    pub fn listener_count(&self, event_type: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .by_type
            .get(event_type)
            .map_or(0, Vec::len)
    }

    /// Whether `event_type` has any registration.
    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.inner.listeners.lock().by_type.contains_key(event_type)
    }

    /// Event types with at least one registration.
    pub fn event_types(&self) -> Vec<String> {
        self.inner.listeners.lock().by_type.keys().cloned().collect()
    }

    /// Whether there are no registrations at all.
    pub fn is_empty(&self) -> bool {
        self.inner.listeners.lock().by_type.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.inner.listeners.lock().by_type.clear();
        debug!("All listeners cleared");
    }

    /// Get router statistics.
    pub fn stats(&self) -> RouterStats {
        self.inner.stats.read().clone()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("event_types", &self.event_types())
            .finish()
    }
}

/// Handle to a single registration.
///
/// Dropping it leaves the registration in place; call
/// [`unsubscribe`](Subscription::unsubscribe) to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    event_type: String,
    id: ListenerId,
    router: Weak<RouterInner>,
}

impl Subscription {
    /// Event type this registration listens to.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Remove this registration.
    ///
    /// Returns `false` if it was already removed. Removing the last
    /// registration of a type forgets the type entirely.
    pub fn unsubscribe(&self) -> bool {
        let Some(router) = self.router.upgrade() else {
            return false;
        };

        let mut listeners = router.listeners.lock();
        let Some(entries) = listeners.by_type.get_mut(&self.event_type) else {
            return false;
        };

        let before = entries.len();
        entries.retain(|listener| listener.id != self.id);
        let removed = entries.len() != before;

        if entries.is_empty() {
            listeners.by_type.remove(&self.event_type);
        }

        if removed {
            debug!(event_type = %self.event_type, listener = self.id, "Listener removed");
        }
        removed
    }
}

/// Router statistics.
#[derive(Debug, Clone, Default)]
pub struct RouterStats {
    /// Events dispatched since creation.
    pub events_dispatched: u64,
    /// Callback invocations since creation.
    pub callbacks_invoked: u64,
    /// Callback invocations that panicked.
    pub callback_panics: u64,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str) -> RealtimeEvent {
        RealtimeEvent {
            event_type: event_type.to_string(),
            data: serde_json::json!({"id": 1}),
            timestamp: 1000,
            user_id: None,
        }
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&RealtimeEvent) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move |_: &RealtimeEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_typed_delivery() {
        let router = EventRouter::new();
        let (skills, on_skill) = counter();
        let _sub = router.subscribe("skill_created", on_skill);

        router.dispatch(&event("skill_created"));
        router.dispatch(&event("pool_created"));
        router.dispatch(&event("skill_created"));

        assert_eq!(skills.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wildcard_receives_everything() {
        let router = EventRouter::new();
        let (all, on_any) = counter();
        let _sub = router.subscribe(WILDCARD, on_any);

        router.dispatch(&event("skill_created"));
        router.dispatch(&event("something_new"));

        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_wildcard_typed_event_delivered_once() {
        let router = EventRouter::new();
        let (all, on_any) = counter();
        let _sub = router.subscribe(WILDCARD, on_any);

        router.dispatch(&event(WILDCARD));
        assert_eq!(all.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_typed_before_wildcard_in_registration_order() {
        let router = EventRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = order.clone();
        let _w = router.subscribe(WILDCARD, move |_| o.lock().push("wildcard"));
        let o = order.clone();
        let _a = router.subscribe("pool_matched", move |_| o.lock().push("first"));
        let o = order.clone();
        let _b = router.subscribe("pool_matched", move |_| o.lock().push("second"));

        router.dispatch(&event("pool_matched"));

        assert_eq!(*order.lock(), vec!["first", "second", "wildcard"]);
    }

    #[test]
    fn test_unsubscribe_removes_only_one_registration() {
        let router = EventRouter::new();
        let (first, on_first) = counter();
        let (second, on_second) = counter();
        let sub_first = router.subscribe("skill_updated", on_first);
        let _sub_second = router.subscribe("skill_updated", on_second);

        assert!(sub_first.unsubscribe());
        router.dispatch(&event("skill_updated"));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(router.listener_count("skill_updated"), 1);
    }

    #[test]
    fn test_same_callback_registered_twice_is_independent() {
        let router = EventRouter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let callback = Arc::new(move |_: &RealtimeEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        let cb = callback.clone();
        let sub_a = router.subscribe("pool_applied", move |e| cb(e));
        let cb = callback.clone();
        let sub_b = router.subscribe("pool_applied", move |e| cb(e));

        router.dispatch(&event("pool_applied"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        sub_a.unsubscribe();
        router.dispatch(&event("pool_applied"));
        assert_eq!(count.load(Ordering::SeqCst), 3);

        sub_b.unsubscribe();
        router.dispatch(&event("pool_applied"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_last_unsubscribe_leaves_no_bookkeeping() {
        let router = EventRouter::new();
        let (count, on_event) = counter();
        let sub = router.subscribe("transaction_confirmed", on_event);
        assert!(router.has_listeners("transaction_confirmed"));

        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());

        router.dispatch(&event("transaction_confirmed"));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(!router.has_listeners("transaction_confirmed"));
        assert!(router.event_types().is_empty());
        assert!(router.is_empty());
    }

    #[test]
    fn test_panicking_callback_is_contained() {
        let router = EventRouter::new();
        let (typed, on_typed) = counter();
        let (all, on_any) = counter();

        let _bad = router.subscribe("skill_created", |_| panic!("listener bug"));
        let _good = router.subscribe("skill_created", on_typed);
        let _any = router.subscribe(WILDCARD, on_any);

        router.dispatch(&event("skill_created"));

        assert_eq!(typed.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 1);
        assert_eq!(router.stats().callback_panics, 1);
    }

    #[test]
    fn test_unsubscribe_during_dispatch() {
        let router = EventRouter::new();
        let (count, on_event) = counter();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let s = slot.clone();
        let sub = router.subscribe("pool_created", move |_| {
            if let Some(sub) = s.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);
        let _other = router.subscribe("pool_created", on_event);

        router.dispatch(&event("pool_created"));
        router.dispatch(&event("pool_created"));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(router.listener_count("pool_created"), 1);
    }

    #[test]
    fn test_subscribe_during_dispatch() {
        let router = EventRouter::new();
        let inner = router.clone();
        let _sub = router.subscribe("skill_created", move |_| {
            let _ = inner.subscribe("skill_created", |_| {});
        });

        router.dispatch(&event("skill_created"));
        assert_eq!(router.listener_count("skill_created"), 2);
    }

    #[test]
    fn test_clear() {
        let router = EventRouter::new();
        let sub = router.subscribe("skill_created", |_| {});
        let _any = router.subscribe(WILDCARD, |_| {});

        router.clear();
        assert!(router.is_empty());
        assert!(!sub.unsubscribe());
    }

    #[tokio::test]
    async fn test_event_stream() {
        let router = EventRouter::new();
        let mut rx = router.events();

        router.dispatch(&event("pool_matched"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type, "pool_matched");
    }

    #[test]
    fn test_stats() {
        let router = EventRouter::new();
        let _a = router.subscribe("skill_created", |_| {});
        let _b = router.subscribe(WILDCARD, |_| {});

        router.dispatch(&event("skill_created"));
        router.dispatch(&event("pool_created"));

        let stats = router.stats();
        assert_eq!(stats.events_dispatched, 2);
        assert_eq!(stats.callbacks_invoked, 3);
        assert_eq!(stats.callback_panics, 0);
    }
}
