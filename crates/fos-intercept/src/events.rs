//! XHR events
//!
//! Event kinds, payloads and the listener table. Every kind has one
//! ordered subscriber list; `onX = handler` style assignment occupies a
//! distinguished slot in that list which later assignments overwrite in
//! place.

use crate::transport::ReadyState;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Event kinds fired by an XMLHttpRequest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReadyStateChange,
    LoadStart,
    Progress,
    Load,
    LoadEnd,
    Error,
    Abort,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ReadyStateChange => "readystatechange",
            EventKind::LoadStart => "loadstart",
            EventKind::Progress => "progress",
            EventKind::Load => "load",
            EventKind::LoadEnd => "loadend",
            EventKind::Error => "error",
            EventKind::Abort => "abort",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event delivered to listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Ready state at dispatch time
    pub ready_state: ReadyState,
    /// Bytes received so far
    pub loaded: u64,
    /// Expected total, when a length was declared
    pub total: Option<u64>,
}

impl Event {
    pub fn new(kind: EventKind, ready_state: ReadyState) -> Self {
        Self {
            kind,
            ready_state,
            loaded: 0,
            total: None,
        }
    }

    /// Progress-style event
    pub fn progress(kind: EventKind, ready_state: ReadyState, loaded: u64, total: Option<u64>) -> Self {
        Self {
            kind,
            ready_state,
            loaded,
            total,
        }
    }

    /// Is the total length known?
    pub fn length_computable(&self) -> bool {
        self.total.is_some()
    }
}

/// Event callback
pub type Listener = Rc<dyn Fn(&Event)>;

/// Subscription handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Subscriber {
    id: ListenerId,
    listener: Listener,
}

/// Event listener storage
#[derive(Default)]
pub struct EventRegistry {
    /// Event kind -> subscribers in registration order
    listeners: HashMap<EventKind, Vec<Subscriber>>,
    /// Event kind -> subscriber occupying the handler slot
    slots: HashMap<EventKind, ListenerId>,
    next_id: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event listener
    pub fn add_listener(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = self.allocate_id();
        self.listeners
            .entry(kind)
            .or_default()
            .push(Subscriber { id, listener });
        id
    }

    /// Remove an event listener
    pub fn remove_listener(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(subscribers) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let Some(pos) = subscribers.iter().position(|s| s.id == id) else {
            return false;
        };
        subscribers.remove(pos);
        if self.slots.get(&kind) == Some(&id) {
            self.slots.remove(&kind);
        }
        true
    }

    /// Assign the `onX` handler slot. `None` clears it.
    ///
    /// Reassignment keeps the slot's original position in dispatch order.
    pub fn set_handler(&mut self, kind: EventKind, handler: Option<Listener>) {
        match (self.slots.get(&kind).copied(), handler) {
            (Some(id), Some(listener)) => {
                if let Some(sub) = self
                    .listeners
                    .get_mut(&kind)
                    .and_then(|subs| subs.iter_mut().find(|s| s.id == id))
                {
                    sub.listener = listener;
                }
            }
            (Some(id), None) => {
                self.remove_listener(kind, id);
            }
            (None, Some(listener)) => {
                let id = self.add_listener(kind, listener);
                self.slots.insert(kind, id);
            }
            (None, None) => {}
        }
    }

    /// Is a handler slot assigned?
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.slots.contains_key(&kind)
    }

    /// Number of subscribers for a kind, slot included
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, |subs| subs.len())
    }

    /// Snapshot the subscribers for a kind in dispatch order.
    ///
    /// Callers dispatch from the snapshot so listeners may touch the
    /// registry while running.
    pub fn snapshot(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|subs| subs.iter().map(|s| s.listener.clone()).collect())
            .unwrap_or_default()
    }

    fn allocate_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, subs)| (*kind, subs.len()))
            .collect();
        f.debug_struct("EventRegistry")
            .field("listeners", &counts)
            .field("slots", &self.slots)
            .finish()
    }
}

/// Dispatch an event to a snapshot of listeners
pub fn dispatch(listeners: &[Listener], event: &Event) {
    for listener in listeners {
        listener(event);
    }
}
