//! Listener registry with priorities, one-shot listeners and propagation
//! control.
//!
//! Listeners for an event run in descending priority; equal priorities run
//! in registration order. A listener may call
//! [`Event::stop_propagation`] to skip the rest of the list. Dispatch walks
//! a snapshot of the list, so listeners can register or remove listeners
//! (including themselves) while running.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// An event that can be dispatched through an [`EventDispatcher`].
pub trait Event: Any + Send {
    /// Stable name used in logs
    const NAME: &'static str;

    fn is_propagation_stopped(&self) -> bool;

    fn stop_propagation(&mut self);
}

/// Handle returned on registration, used to remove a single listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ListenerFn<E> = dyn Fn(&mut E) -> anyhow::Result<()> + Send + Sync;

struct Typed<E: Event>(Box<ListenerFn<E>>);

#[derive(Clone)]
struct Entry {
    id: ListenerId,
    priority: i32,
    once: bool,
    listener: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<TypeId, Vec<Entry>>,
}

impl Registry {
    fn remove(&mut self, id: ListenerId) -> bool {
        for entries in self.listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|e| e.id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }
}

#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<RwLock<Registry>>,
    next_id: Arc<AtomicU64>,
}

impl EventDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `E`.
    pub fn on<E, F>(&self, priority: i32, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert::<E>(priority, false, Box::new(listener))
    }

    /// Register a listener removed right after its first invocation.
    pub fn one<E, F>(&self, priority: i32, listener: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.insert::<E>(priority, true, Box::new(listener))
    }

    fn insert<E: Event>(&self, priority: i32, once: bool, listener: Box<ListenerFn<E>>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = Entry {
            id,
            priority,
            once,
            listener: Arc::new(Typed::<E>(listener)),
        };
        let mut registry = self.registry.write();
        let entries = registry.listeners.entry(TypeId::of::<E>()).or_default();
        // after every entry with priority >= ours keeps ties in registration order
        let pos = entries.partition_point(|e| e.priority >= priority);
        entries.insert(pos, entry);
        debug!(event = E::NAME, priority, once, "Listener registered");
        id
    }

    /// Remove every listener of `E`.
    pub fn off<E: Event>(&self) {
        let removed = self.registry.write().listeners.remove(&TypeId::of::<E>());
        debug!(
            event = E::NAME,
            removed = removed.map_or(0, |v| v.len()),
            "Listeners removed"
        );
    }

    /// Remove one listener. Returns false when it was already gone.
    pub fn off_listener(&self, id: ListenerId) -> bool {
        self.registry.write().remove(id)
    }

    #[must_use]
    pub fn has_listeners<E: Event>(&self) -> bool {
        self.listener_count::<E>() > 0
    }

    #[must_use]
    pub fn listener_count<E: Event>(&self) -> usize {
        self.registry
            .read()
            .listeners
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Run the listeners of `E` against `event`.
    ///
    /// Stops early when a listener stops propagation or fails; the failure is
    /// returned to the caller.
    pub fn dispatch<E: Event>(&self, event: &mut E) -> anyhow::Result<()> {
        let snapshot: Vec<Entry> = match self.registry.read().listeners.get(&TypeId::of::<E>()) {
            Some(entries) if !entries.is_empty() => entries.clone(),
            _ => return Ok(()),
        };
        trace!(event = E::NAME, listeners = snapshot.len(), "Dispatching event");

        for entry in snapshot {
            if event.is_propagation_stopped() {
                trace!(event = E::NAME, "Propagation stopped");
                break;
            }
            // a one-shot listener runs only if this dispatch claimed it
            if entry.once && !self.registry.write().remove(entry.id) {
                continue;
            }
            let Some(typed) = entry.listener.downcast_ref::<Typed<E>>() else {
                continue;
            };
            (typed.0)(event)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        let total: usize = registry.listeners.values().map(Vec::len).sum();
        f.debug_struct("EventDispatcher")
            .field("events", &registry.listeners.len())
            .field("listeners", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Ping {
        seen: Vec<i32>,
        stopped: bool,
    }

    impl Event for Ping {
        const NAME: &'static str = "ping";

        fn is_propagation_stopped(&self) -> bool {
            self.stopped
        }

        fn stop_propagation(&mut self) {
            self.stopped = true;
        }
    }

    #[test]
    fn test_priority_then_registration_order() {
        let events = EventDispatcher::new();
        events.on::<Ping, _>(0, |e| {
            e.seen.push(1);
            Ok(())
        });
        events.on::<Ping, _>(5, |e| {
            e.seen.push(2);
            Ok(())
        });
        events.on::<Ping, _>(0, |e| {
            e.seen.push(3);
            Ok(())
        });
        let mut ping = Ping::default();
        events.dispatch(&mut ping).unwrap();
        assert_eq!(ping.seen, vec![2, 1, 3]);
    }

    #[test]
    fn test_one_shot_removed_even_when_stopping() {
        let events = EventDispatcher::new();
        events.one::<Ping, _>(10, |e| {
            e.seen.push(10);
            e.stop_propagation();
            Ok(())
        });
        events.on::<Ping, _>(0, |e| {
            e.seen.push(0);
            Ok(())
        });

        let mut first = Ping::default();
        events.dispatch(&mut first).unwrap();
        assert_eq!(first.seen, vec![10]);

        let mut second = Ping::default();
        events.dispatch(&mut second).unwrap();
        assert_eq!(second.seen, vec![0]);
    }

    #[test]
    fn test_error_aborts_remaining_listeners() {
        let events = EventDispatcher::new();
        let ran = Arc::new(Mutex::new(false));
        events.on::<Ping, _>(1, |_| anyhow::bail!("boom"));
        let flag = Arc::clone(&ran);
        events.on::<Ping, _>(0, move |_| {
            *flag.lock() = true;
            Ok(())
        });
        let err = events.dispatch(&mut Ping::default()).unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!*ran.lock());
    }

    #[test]
    fn test_off_and_off_listener() {
        let events = EventDispatcher::new();
        let id = events.on::<Ping, _>(0, |_| Ok(()));
        events.on::<Ping, _>(0, |_| Ok(()));
        assert_eq!(events.listener_count::<Ping>(), 2);
        assert!(events.off_listener(id));
        assert!(!events.off_listener(id));
        events.off::<Ping>();
        assert!(!events.has_listeners::<Ping>());
    }

    #[test]
    fn test_listener_may_register_during_dispatch() {
        let events = EventDispatcher::new();
        let inner = events.clone();
        events.on::<Ping, _>(0, move |e| {
            e.seen.push(1);
            inner.on::<Ping, _>(0, |e| {
                e.seen.push(2);
                Ok(())
            });
            Ok(())
        });
        let mut first = Ping::default();
        events.dispatch(&mut first).unwrap();
        assert_eq!(first.seen, vec![1]);
        assert_eq!(events.listener_count::<Ping>(), 2);
    }
}
