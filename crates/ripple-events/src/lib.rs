//! Ripple Events
//!
//! This crate provides the event layer of the Ripple runtime: a named-event
//! hub that any type can embed to gain publish/subscribe behaviour.
//!
//! - [`EventHub`]: per-entity listener table with synchronous dispatch
//! - [`Events`]: trait giving any hub owner `on`/`off`/`trigger`/`listen_to`
//! - [`Callback`]: identity-compared listener handle
//! - [`EventLogger`] and [`EventRecorder`]: wildcard listeners for tracing
//!   and inspecting event traffic
//!
//! # Dispatch Rules
//!
//! - Listeners run synchronously, in registration order.
//! - Listeners registered under [`ALL`] run after the named listeners of
//!   every event and can read the event name from [`Event::name`].
//! - `once` listeners run at most one time and then remove themselves.
//! - A dispatch works on a snapshot of the listener list, so listeners may
//!   freely subscribe or unsubscribe while it runs.
//!
//! # Usage
//!
//! ```
//! use ripple_events::{Callback, Event, EventHub, Events};
//!
//! let hub: EventHub<String> = EventHub::new();
//! let greet = Callback::new(|event: &Event<'_, String>| {
//!     println!("{} says {}", event.name, event.payload);
//! });
//!
//! hub.once("hello", &greet);
//! hub.trigger("hello", &"hi".to_string());
//! assert!(hub.is_empty());
//! ```
//!
//! # Listening To Other Entities
//!
//! ```ignore
//! use ripple_events::Events;
//!
//! view.listen_to(&model, "change", &render);
//! // ... later, release everything the view subscribed to ...
//! view.stop_listening();
//! ```

pub mod emitter;
pub mod hub;
pub mod id;
pub mod recorder;

// Re-export main types
pub use emitter::Events;
pub use hub::{ALL, Callback, Event, EventHub};
pub use id::{ListenerId, unique_id};
pub use recorder::{EventLogger, EventRecorder, RecordedEvent};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::emitter::Events;
    pub use crate::hub::{ALL, Callback, Event, EventHub};
    pub use crate::id::ListenerId;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_once_ping_fires_once() {
        let hub: EventHub<()> = EventHub::new();
        let calls = Rc::new(Cell::new(0));

        let counter = Rc::clone(&calls);
        let listener = Callback::new(move |_event: &Event<'_, ()>| counter.set(counter.get() + 1));
        hub.once("ping", &listener);

        hub.trigger("ping", &());
        hub.trigger("ping", &());

        assert_eq!(calls.get(), 1);
        assert!(!hub.hub().has_listeners("ping"));
    }

    #[test]
    fn test_no_listeners_no_dispatch() {
        let hub: EventHub<u8> = EventHub::new();
        hub.trigger("anything", &1);
        assert!(hub.is_empty());
    }
}
