//! Routes decoded server events to registered handlers.
//!
//! Handlers are registered per [`EventType`] (many per type) or as wildcards
//! that see every event. For each event, wildcard handlers run first in
//! registration order, then the type's handlers in registration order.
//!
//! Dispatch is synchronous: the connection's reader task calls
//! [`EventDispatcher::dispatch`] once per inbound frame and the whole chain
//! completes before the next frame is read. A panicking handler is caught
//! and logged; the rest of the chain still runs.
//!
//! Registrations live here and not on the transport, so they survive
//! reconnects.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use syncboard_proto::event::{EventType, ServerEvent};

/// A registered event callback.
pub type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    typed: HashMap<EventType, Vec<(u64, Handler)>>,
    any: Vec<(u64, Handler)>,
}

impl Registry {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Capability returned by a subscribe call; removes exactly that
/// registration.
///
/// Dropping it without calling [`unsubscribe`](Self::unsubscribe) leaves the
/// handler registered.
pub struct Subscription {
    registry: Weak<Mutex<Registry>>,
    key: Option<EventType>,
    id: u64,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Removes the handler. Has no effect if the dispatcher is gone.
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock();
        let list = match self.key {
            Some(event_type) => registry.typed.get_mut(&event_type),
            None => Some(&mut registry.any),
        };
        if let Some(list) = list {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Fan-out of inbound events to handlers. Cheap to clone; clones share
/// registrations.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

impl EventDispatcher {
    /// Creates a dispatcher with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `event_type`.
    pub fn subscribe<F>(&self, event_type: EventType, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.allocate();
        registry
            .typed
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            key: Some(event_type),
            id,
        }
    }

    /// Registers `handler` for every event.
    pub fn subscribe_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.allocate();
        registry.any.push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            key: None,
            id,
        }
    }

    /// Number of live registrations, wildcards included.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        let registry = self.registry.lock();
        registry.any.len() + registry.typed.values().map(Vec::len).sum::<usize>()
    }

    /// Runs the handler chain for `event`. Returns how many handlers ran
    /// to completion.
    ///
    /// The chain is snapshotted before the first handler runs, so handlers
    /// may subscribe or unsubscribe without deadlocking; such changes take
    /// effect from the next event.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let chain: Vec<Handler> = {
            let registry = self.registry.lock();
            registry
                .any
                .iter()
                .chain(registry.typed.get(&event.event_type()).into_iter().flatten())
                .map(|(_, handler)| Arc::clone(handler))
                .collect()
        };

        let mut completed = 0;
        for handler in chain {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => completed += 1,
                Err(payload) => {
                    tracing::error!(
                        event_type = %event.event_type(),
                        panic = %panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
        completed
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&'static str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncboard_proto::model::Board;

    fn sync_event() -> ServerEvent {
        ServerEvent::BoardSync {
            board: Board::new("b1", "Board"),
        }
    }

    fn left_event() -> ServerEvent {
        ServerEvent::PresenceLeft {
            user_id: "u1".into(),
        }
    }

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl Fn(&ServerEvent) + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_| log.lock().push(tag)
    }

    #[test]
    fn wildcards_run_before_typed_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.subscribe(EventType::BoardSync, recorder(&log, "typed-1"));
        dispatcher.subscribe_any(recorder(&log, "any-1"));
        dispatcher.subscribe(EventType::BoardSync, recorder(&log, "typed-2"));
        dispatcher.subscribe_any(recorder(&log, "any-2"));

        assert_eq!(dispatcher.dispatch(&sync_event()), 4);
        assert_eq!(*log.lock(), ["any-1", "any-2", "typed-1", "typed-2"]);
    }

    #[test]
    fn typed_handlers_only_see_their_type() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.subscribe(EventType::BoardSync, recorder(&log, "sync"));
        dispatcher.subscribe(EventType::PresenceLeft, recorder(&log, "left"));

        dispatcher.dispatch(&left_event());
        assert_eq!(*log.lock(), ["left"]);
    }

    #[test]
    fn unsubscribe_removes_exactly_one_registration() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        let first = dispatcher.subscribe(EventType::BoardSync, recorder(&log, "a"));
        dispatcher.subscribe(EventType::BoardSync, recorder(&log, "b"));
        let wildcard = dispatcher.subscribe_any(recorder(&log, "w"));
        assert_eq!(dispatcher.handler_count(), 3);

        first.unsubscribe();
        wildcard.unsubscribe();
        assert_eq!(dispatcher.handler_count(), 1);

        dispatcher.dispatch(&sync_event());
        assert_eq!(*log.lock(), ["b"]);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let dispatcher = EventDispatcher::new();
        let log: Log = Arc::default();
        dispatcher.subscribe(EventType::BoardSync, |_| panic!("boom"));
        dispatcher.subscribe(EventType::BoardSync, recorder(&log, "after"));

        assert_eq!(dispatcher.dispatch(&sync_event()), 1);
        assert_eq!(dispatcher.dispatch(&sync_event()), 1);
        assert_eq!(*log.lock(), ["after", "after"]);
    }

    #[test]
    fn handler_may_unsubscribe_itself_during_dispatch() {
        let dispatcher = EventDispatcher::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::default();
        let hits = Arc::new(Mutex::new(0));

        let slot_in = Arc::clone(&slot);
        let hits_in = Arc::clone(&hits);
        let sub = dispatcher.subscribe(EventType::BoardSync, move |_| {
            *hits_in.lock() += 1;
            if let Some(sub) = slot_in.lock().take() {
                sub.unsubscribe();
            }
        });
        *slot.lock() = Some(sub);

        dispatcher.dispatch(&sync_event());
        dispatcher.dispatch(&sync_event());
        assert_eq!(*hits.lock(), 1);
        assert_eq!(dispatcher.handler_count(), 0);
    }

    #[test]
    fn unsubscribe_after_dispatcher_dropped_is_harmless() {
        let dispatcher = EventDispatcher::new();
        let sub = dispatcher.subscribe_any(|_| {});
        drop(dispatcher);
        sub.unsubscribe();
    }

    #[test]
    fn clones_share_registrations() {
        let dispatcher = EventDispatcher::new();
        let clone = dispatcher.clone();
        clone.subscribe_any(|_| {});
        assert_eq!(dispatcher.handler_count(), 1);
    }
}
