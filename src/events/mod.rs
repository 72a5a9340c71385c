//! Event channel
//!
//! Every test node and the runner own an [`EventChannel`]. The [`Emitter`]
//! trait gives them a common `on` / `once` / `off` / `emit` surface; test
//! nodes override [`Emitter::emit`] to bubble events to their parent.

mod channel;
mod event;

pub use channel::{EventChannel, Handler, ListenOptions, ListenerId};
pub use event::{Event, Payload};

use std::sync::Arc;

/// Publish/subscribe surface shared by nodes and the runner
pub trait Emitter {
    /// The listener registry of this emitter
    fn channel(&self) -> &EventChannel;

    /// Build an event raised by this emitter
    fn event(&self, name: &str, payload: Payload) -> Event;

    /// Deliver an event to local listeners
    fn emit(&self, event: Event) {
        self.channel().dispatch(&event);
    }

    /// Build and deliver an event in one step
    fn emit_named(&self, name: &str, payload: Payload) {
        self.emit(self.event(name, payload));
    }

    /// Listen to a named event
    fn on<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.channel()
            .subscribe(Some(event), Arc::new(handler), ListenOptions::default())
    }

    /// Listen to every event
    fn on_any<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.channel()
            .subscribe(None, Arc::new(handler), ListenOptions::default())
    }

    /// Listen to the next occurrence of a named event only
    fn once<F>(&self, event: &str, handler: F) -> ListenerId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.channel()
            .subscribe(Some(event), Arc::new(handler), ListenOptions::once())
    }

    /// Remove a listener
    fn off(&self, id: ListenerId) -> bool {
        self.channel().unsubscribe(id)
    }
}
