//! The [`Events`] trait: event behaviour for any type that owns a hub.

use crate::hub::{Callback, EventHub};
use crate::id::ListenerId;

/// Publish/subscribe behaviour for an entity.
///
/// Implementors only expose their [`EventHub`]; every other method is
/// provided. Methods return `&Self` so calls can be chained.
///
/// # Example
///
/// ```
/// use ripple_events::{Callback, Event, EventHub, Events};
///
/// struct Door {
///     events: EventHub<bool>,
/// }
///
/// impl Events<bool> for Door {
///     fn hub(&self) -> &EventHub<bool> {
///         &self.events
///     }
/// }
///
/// let door = Door { events: EventHub::new() };
/// let announce = Callback::new(|event: &Event<'_, bool>| println!("{} -> {}", event.name, event.payload));
/// door.on("open close", &announce).trigger("open", &true);
/// ```
pub trait Events<P: 'static> {
    /// The entity's hub.
    fn hub(&self) -> &EventHub<P>;

    /// The entity's identity, used as its listener context.
    fn context(&self) -> &ListenerId {
        self.hub().listen_id()
    }

    /// Listen to one or more whitespace-separated events.
    fn on(&self, names: &str, callback: &Callback<P>) -> &Self {
        self.hub().subscribe(names, callback, None, false);
        self
    }

    /// [`on`](Self::on) with an explicit listener context.
    fn on_with_context(&self, names: &str, callback: &Callback<P>, context: &ListenerId) -> &Self {
        self.hub().subscribe(names, callback, Some(context), false);
        self
    }

    /// Listen for the next occurrence of each event only.
    fn once(&self, names: &str, callback: &Callback<P>) -> &Self {
        self.hub().subscribe(names, callback, None, true);
        self
    }

    /// [`once`](Self::once) with an explicit listener context.
    fn once_with_context(
        &self,
        names: &str,
        callback: &Callback<P>,
        context: &ListenerId,
    ) -> &Self {
        self.hub().subscribe(names, callback, Some(context), true);
        self
    }

    /// Listen with a map of event names to callbacks.
    fn on_map<N: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (N, Callback<P>)>) -> &Self {
        self.hub().subscribe_map(pairs, None, false);
        self
    }

    /// [`once`](Self::once) for each entry of a map of names to callbacks.
    fn once_map<N: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (N, Callback<P>)>) -> &Self {
        self.hub().subscribe_map(pairs, None, true);
        self
    }

    /// Remove listeners. See [`EventHub::unsubscribe`] for selector rules.
    fn off(
        &self,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
        context: Option<&ListenerId>,
    ) -> &Self {
        self.hub().unsubscribe(names, callback, context);
        self
    }

    /// Remove `callback` from each event named in the map.
    fn off_map<N: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (N, Callback<P>)>) -> &Self {
        for (names, callback) in pairs {
            self.hub().unsubscribe(Some(names.as_ref()), Some(&callback), None);
        }
        self
    }

    /// Fire one or more whitespace-separated events.
    fn trigger(&self, names: &str, payload: &P) -> &Self {
        self.hub().dispatch(names, payload);
        self
    }

    /// Fire each event of a map with its own payload.
    fn trigger_map<N: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (N, P)>) -> &Self {
        self.hub().dispatch_map(pairs);
        self
    }

    /// Listen to events on another entity, remembering the relationship.
    fn listen_to<Q: 'static, E: Events<Q> + ?Sized>(
        &self,
        other: &E,
        names: &str,
        callback: &Callback<Q>,
    ) -> &Self {
        self.hub().listen(other.hub(), names, callback, false);
        self
    }

    /// [`listen_to`](Self::listen_to) for the next occurrence only.
    fn listen_to_once<Q: 'static, E: Events<Q> + ?Sized>(
        &self,
        other: &E,
        names: &str,
        callback: &Callback<Q>,
    ) -> &Self {
        self.hub().listen(other.hub(), names, callback, true);
        self
    }

    /// [`listen_to`](Self::listen_to) with a map of names to callbacks.
    fn listen_to_map<Q: 'static, E: Events<Q> + ?Sized, N: AsRef<str>>(
        &self,
        other: &E,
        pairs: impl IntoIterator<Item = (N, Callback<Q>)>,
    ) -> &Self {
        self.hub().listen_map(other.hub(), pairs, false);
        self
    }

    /// Release every listener this entity registered on others.
    fn stop_listening(&self) -> &Self {
        self.hub().stop_listening();
        self
    }

    /// Release listeners registered on `other`, narrowed by `names` and
    /// `callback` when given.
    fn stop_listening_to<Q: 'static, E: Events<Q> + ?Sized>(
        &self,
        other: &E,
        names: Option<&str>,
        callback: Option<&Callback<Q>>,
    ) -> &Self {
        self.hub().stop_listening_to(other.hub(), names, callback);
        self
    }
}

impl<P: 'static> Events<P> for EventHub<P> {
    fn hub(&self) -> &EventHub<P> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::Event;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Button {
        events: EventHub<String>,
    }

    impl Events<String> for Button {
        fn hub(&self) -> &EventHub<String> {
            &self.events
        }
    }

    struct Panel {
        events: EventHub<()>,
    }

    impl Events<()> for Panel {
        fn hub(&self) -> &EventHub<()> {
            &self.events
        }
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>) -> Callback<String> {
        let log = Rc::clone(log);
        Callback::new(move |event: &Event<'_, String>| {
            log.borrow_mut()
                .push(format!("{}={}", event.name, event.payload))
        })
    }

    #[test]
    fn test_chaining() {
        let button = Button {
            events: EventHub::new(),
        };
        let log = Rc::new(RefCell::new(Vec::new()));
        let callback = recorder(&log);

        button
            .on("click", &callback)
            .trigger("click", &"one".to_string())
            .off(Some("click"), None, None)
            .trigger("click", &"two".to_string());

        assert_eq!(*log.borrow(), vec!["click=one"]);
    }

    #[test]
    fn test_once_map_and_off_map() {
        let button = Button {
            events: EventHub::new(),
        };
        let log = Rc::new(RefCell::new(Vec::new()));
        let callback = recorder(&log);

        button.once_map([("press", callback.clone())]);
        button.on_map([("hover", callback.clone())]);
        button.off_map([("hover", callback.clone())]);
        button.trigger_map([("press", "a".to_string()), ("hover", "b".to_string())]);
        button.trigger("press", &"c".to_string());

        assert_eq!(*log.borrow(), vec!["press=a"]);
    }

    #[test]
    fn test_entities_listen_to_each_other() {
        let button = Button {
            events: EventHub::new(),
        };
        let panel = Panel {
            events: EventHub::new(),
        };
        let log = Rc::new(RefCell::new(Vec::new()));

        panel.listen_to(&button, "click", &recorder(&log));
        panel.listen_to_once(&button, "hover", &recorder(&log));

        button.trigger("click hover", &"x".to_string());
        button.trigger("click hover", &"y".to_string());
        panel.stop_listening_to(&button, None, None::<&Callback<String>>);
        button.trigger("click", &"z".to_string());

        assert_eq!(*log.borrow(), vec!["click=x", "hover=x", "click=y"]);
        assert!(button.hub().is_empty());
    }

    #[test]
    fn test_listener_context_is_listener_identity() {
        let button = Button {
            events: EventHub::new(),
        };
        let panel = Panel {
            events: EventHub::new(),
        };
        let seen = Rc::new(RefCell::new(None));

        let sink = Rc::clone(&seen);
        panel.listen_to(
            &button,
            "click",
            &Callback::new(move |event: &Event<'_, String>| {
                *sink.borrow_mut() = Some(event.context.clone())
            }),
        );
        button.trigger("click", &String::new());

        assert_eq!(seen.borrow().as_ref(), Some(panel.context()));
    }
}
