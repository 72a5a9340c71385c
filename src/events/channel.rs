//! Listener registry and synchronous dispatch
//!
//! Listeners are invoked in registration order. Dispatch works on a snapshot
//! of the registry so handlers may freely register, remove or emit while
//! being called; no lock is held during a handler call.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Event;

/// Event handler
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle returned by registration, used to remove a listener again
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Registration options
#[derive(Clone, Copy, Debug, Default)]
pub struct ListenOptions {
    /// Remove the listener after its first invocation
    pub once: bool,
}

impl ListenOptions {
    pub fn once() -> Self {
        Self { once: true }
    }
}

struct Listener {
    id: ListenerId,
    /// `None` listens to every event
    event: Option<String>,
    handler: Handler,
    once: bool,
}

impl Listener {
    fn matches(&self, name: &str) -> bool {
        self.event.as_deref().map_or(true, |e| e == name)
    }
}

/// Per-emitter listener registry
#[derive(Default)]
pub struct EventChannel {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. `event == None` registers a wildcard handler that
    /// sees every event; it can read the event name from [`Event::name`].
    pub fn subscribe(
        &self,
        event: Option<&str>,
        handler: Handler,
        options: ListenOptions,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            event: event.map(str::to_string),
            handler,
            once: options.once,
        });
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Invoke every listener matching `event.name`, in registration order.
    pub fn dispatch(&self, event: &Event) {
        let handlers: Vec<Handler> = {
            let mut listeners = self.listeners.lock();
            let matched: Vec<Handler> = listeners
                .iter()
                .filter(|l| l.matches(&event.name))
                .map(|l| l.handler.clone())
                .collect();
            listeners.retain(|l| !(l.once && l.matches(&event.name)));
            matched
        };

        for handler in handlers {
            handler(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
