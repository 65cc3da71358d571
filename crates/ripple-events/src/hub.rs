//! Subscription tables and synchronous dispatch.
//!
//! An [`EventHub`] is a cheap, clonable handle over one entity's listener
//! table. Clones share the same table, the same way `Rc` clones share a
//! value. The hub never holds a borrow of its table while a listener runs,
//! so listeners may subscribe, unsubscribe, or dispatch on the same hub.

use std::any::Any;
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::id::ListenerId;

/// Reserved event name whose listeners receive every dispatched event.
pub const ALL: &str = "all";

/// A dispatched event as seen by a listener.
pub struct Event<'a, P> {
    /// Name the event was dispatched under.
    ///
    /// Wildcard listeners use this to tell events apart.
    pub name: &'a str,
    /// The event payload.
    pub payload: &'a P,
    /// Context the listener was registered with, or the identity of the
    /// publishing hub when none was given.
    pub context: &'a ListenerId,
}

impl<P: fmt::Debug> fmt::Debug for Event<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("payload", self.payload)
            .field("context", self.context)
            .finish()
    }
}

/// A listener handle.
///
/// Handles compare by identity: two clones of the same `Callback` are the
/// same listener, two separately created callbacks never are, even if they
/// wrap identical code. Keep a clone around to unsubscribe later.
pub struct Callback<P>(Rc<dyn Fn(&Event<'_, P>)>);

impl<P> Callback<P> {
    /// Wrap a closure as a listener.
    pub fn new(f: impl Fn(&Event<'_, P>) + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the listener.
    pub fn call(&self, event: &Event<'_, P>) {
        (self.0)(event)
    }

    /// Check whether both handles refer to the same listener.
    pub fn same_as(&self, other: &Callback<P>) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<P> Clone for Callback<P> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<P> fmt::Debug for Callback<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// One registered listener.
struct Subscription<P> {
    /// Key used by once-wrappers to remove themselves.
    id: u64,
    /// What dispatch invokes. For `once` this is the self-removing wrapper.
    callback: Callback<P>,
    /// The callback the caller registered, matched by `unsubscribe`.
    identity: Callback<P>,
    context: Option<ListenerId>,
}

impl<P> Subscription<P> {
    fn matches(&self, callback: Option<&Callback<P>>, context: Option<&ListenerId>) -> bool {
        let callback_matches = callback
            .is_none_or(|cb| cb.same_as(&self.callback) || cb.same_as(&self.identity));
        let context_matches = context.is_none_or(|ctx| self.context.as_ref() == Some(ctx));
        callback_matches && context_matches
    }
}

type Bucket<P> = Vec<Rc<Subscription<P>>>;

struct HubState<P> {
    subscriptions: HashMap<String, Bucket<P>>,
    /// Remote hubs this entity listens to, keyed by their identity.
    listening_to: HashMap<ListenerId, Weak<dyn Remote>>,
    next_subscription: u64,
}

impl<P> Default for HubState<P> {
    fn default() -> Self {
        Self {
            subscriptions: HashMap::new(),
            listening_to: HashMap::new(),
            next_subscription: 0,
        }
    }
}

struct HubInner<P> {
    state: RefCell<HubState<P>>,
    listen_id: OnceCell<ListenerId>,
}

impl<P> HubInner<P> {
    fn listen_id(&self) -> &ListenerId {
        self.listen_id.get_or_init(ListenerId::new)
    }

    fn remove_subscription(&self, name: &str, id: u64) {
        let mut state = self.state.borrow_mut();
        let subscriptions = &mut state.subscriptions;
        if let Some(bucket) = subscriptions.get_mut(name) {
            bucket.retain(|sub| sub.id != id);
            if bucket.is_empty() {
                subscriptions.remove(name);
            }
        }
    }

    fn unsubscribe(
        &self,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
        context: Option<&ListenerId>,
    ) {
        let names = names.filter(|n| !n.trim().is_empty());
        let mut state = self.state.borrow_mut();
        let subscriptions = &mut state.subscriptions;

        if names.is_none() && callback.is_none() && context.is_none() {
            subscriptions.clear();
            return;
        }

        let names: Vec<String> = match names {
            Some(names) => split_names(names).map(str::to_string).collect(),
            None => subscriptions.keys().cloned().collect(),
        };

        for name in names {
            if callback.is_none() && context.is_none() {
                subscriptions.remove(&name);
                continue;
            }
            let Some(bucket) = subscriptions.get_mut(&name) else {
                continue;
            };
            bucket.retain(|sub| !sub.matches(callback, context));
            if bucket.is_empty() {
                subscriptions.remove(&name);
            }
        }
    }
}

/// Type-erased view of a hub that someone else listens to.
trait Remote {
    fn release(&self, names: Option<&str>, callback: Option<&dyn Any>, context: &ListenerId);
    fn is_idle(&self) -> bool;
}

impl<P: 'static> Remote for HubInner<P> {
    fn release(&self, names: Option<&str>, callback: Option<&dyn Any>, context: &ListenerId) {
        let callback = match callback {
            // A callback of another payload type cannot be registered here.
            Some(any) => match any.downcast_ref::<Callback<P>>() {
                Some(cb) => Some(cb),
                None => return,
            },
            None => None,
        };
        self.unsubscribe(names, callback, Some(context));
    }

    fn is_idle(&self) -> bool {
        self.state.borrow().subscriptions.is_empty()
    }
}

/// Split a whitespace-separated list of event names.
pub(crate) fn split_names(names: &str) -> impl Iterator<Item = &str> {
    names.split_whitespace()
}

/// Named-event hub for one entity.
///
/// Events are plain strings. Listeners registered under [`ALL`] receive every
/// event. Dispatch is synchronous and follows registration order.
///
/// # Example
///
/// ```
/// use ripple_events::{Callback, Event, EventHub};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let hub: EventHub<u32> = EventHub::new();
/// let total = Rc::new(Cell::new(0));
/// let sink = Rc::clone(&total);
/// let add = Callback::new(move |event: &Event<'_, u32>| sink.set(sink.get() + *event.payload));
///
/// hub.subscribe("tick tock", &add, None, false);
/// hub.dispatch("tick", &2);
/// hub.dispatch("tock", &3);
/// assert_eq!(total.get(), 5);
/// ```
pub struct EventHub<P> {
    inner: Rc<HubInner<P>>,
}

impl<P> Clone for EventHub<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> Default for EventHub<P> {
    fn default() -> Self {
        Self {
            inner: Rc::new(HubInner {
                state: RefCell::new(HubState::default()),
                listen_id: OnceCell::new(),
            }),
        }
    }
}

impl<P: 'static> EventHub<P> {
    /// Create a hub with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// The hub's identity, assigned on first use.
    pub fn listen_id(&self) -> &ListenerId {
        self.inner.listen_id()
    }

    /// Register `callback` under each whitespace-separated name in `names`.
    ///
    /// With `once` set, the stored listener is a wrapper that removes itself
    /// and runs `callback` at most one time. The wrapper still matches
    /// `callback` when unsubscribing.
    pub fn subscribe(
        &self,
        names: &str,
        callback: &Callback<P>,
        context: Option<&ListenerId>,
        once: bool,
    ) {
        for name in split_names(names) {
            let mut state = self.inner.state.borrow_mut();
            let id = state.next_subscription;
            state.next_subscription += 1;

            let invoked = if once {
                self.once_wrapper(name, id, callback)
            } else {
                callback.clone()
            };

            state
                .subscriptions
                .entry(name.to_string())
                .or_default()
                .push(Rc::new(Subscription {
                    id,
                    callback: invoked,
                    identity: callback.clone(),
                    context: context.cloned(),
                }));

            trace!(event = name, once = once, "Listener subscribed");
        }
    }

    /// Register every `(names, callback)` pair.
    pub fn subscribe_map<N: AsRef<str>>(
        &self,
        pairs: impl IntoIterator<Item = (N, Callback<P>)>,
        context: Option<&ListenerId>,
        once: bool,
    ) {
        for (names, callback) in pairs {
            self.subscribe(names.as_ref(), &callback, context, once);
        }
    }

    /// Remove listeners.
    ///
    /// With every selector absent the hub forgets all listeners. Otherwise a
    /// listener under one of `names` (or under any name when `names` is
    /// absent) is removed when it matches `callback`, directly or through a
    /// once-wrapper, and was registered with `context`. Absent selectors
    /// match everything.
    pub fn unsubscribe(
        &self,
        names: Option<&str>,
        callback: Option<&Callback<P>>,
        context: Option<&ListenerId>,
    ) {
        self.inner.unsubscribe(names, callback, context);
    }

    /// Dispatch `payload` under each whitespace-separated name in `names`.
    pub fn dispatch(&self, names: &str, payload: &P) {
        for name in split_names(names) {
            self.emit(name, payload);
        }
    }

    /// Dispatch each `(names, payload)` pair.
    pub fn dispatch_map<N: AsRef<str>>(&self, pairs: impl IntoIterator<Item = (N, P)>) {
        for (names, payload) in pairs {
            self.dispatch(names.as_ref(), &payload);
        }
    }

    /// Dispatch `payload` under exactly one event name.
    ///
    /// Listeners of `name` run first, in registration order, then wildcard
    /// listeners. Both lists are captured before the first listener runs, so
    /// listeners added or removed during dispatch take effect on the next
    /// dispatch.
    pub fn emit(&self, name: &str, payload: &P) {
        let (listeners, wildcard) = {
            let state = self.inner.state.borrow();
            (
                state.subscriptions.get(name).cloned(),
                state.subscriptions.get(ALL).cloned(),
            )
        };

        if listeners.is_none() && wildcard.is_none() {
            return;
        }

        trace!(
            event = name,
            listeners = listeners.as_ref().map_or(0, Vec::len),
            wildcard = wildcard.as_ref().map_or(0, Vec::len),
            "Dispatching event"
        );

        if let Some(listeners) = listeners {
            self.invoke(&listeners, name, payload);
        }
        if let Some(wildcard) = wildcard {
            self.invoke(&wildcard, name, payload);
        }
    }

    fn invoke(&self, bucket: &Bucket<P>, name: &str, payload: &P) {
        for sub in bucket {
            let context = sub
                .context
                .as_ref()
                .unwrap_or_else(|| self.inner.listen_id());
            sub.callback.call(&Event {
                name,
                payload,
                context,
            });
        }
    }

    fn once_wrapper(&self, name: &str, id: u64, callback: &Callback<P>) -> Callback<P> {
        let hub = Rc::downgrade(&self.inner);
        let name = name.to_string();
        let original = callback.clone();
        let fired = Cell::new(false);

        Callback::new(move |event: &Event<'_, P>| {
            if fired.replace(true) {
                return;
            }
            if let Some(hub) = hub.upgrade() {
                hub.remove_subscription(&name, id);
            }
            original.call(event);
        })
    }

    /// Subscribe to `other` on behalf of this hub.
    ///
    /// The subscription's context is this hub's identity, and `other` is
    /// remembered so that [`stop_listening`](Self::stop_listening) can
    /// release it later.
    pub fn listen<Q: 'static>(
        &self,
        other: &EventHub<Q>,
        names: &str,
        callback: &Callback<Q>,
        once: bool,
    ) {
        self.remember(other);
        other.subscribe(names, callback, Some(self.listen_id()), once);
    }

    /// [`listen`](Self::listen) for every `(names, callback)` pair.
    pub fn listen_map<Q: 'static, N: AsRef<str>>(
        &self,
        other: &EventHub<Q>,
        pairs: impl IntoIterator<Item = (N, Callback<Q>)>,
        once: bool,
    ) {
        self.remember(other);
        other.subscribe_map(pairs, Some(self.listen_id()), once);
    }

    fn remember<Q: 'static>(&self, other: &EventHub<Q>) {
        let remote: Weak<HubInner<Q>> = Rc::downgrade(&other.inner);
        let remote: Weak<dyn Remote> = remote;
        self.inner
            .state
            .borrow_mut()
            .listening_to
            .insert(other.listen_id().clone(), remote);
    }

    /// Release every subscription this hub made on other hubs.
    pub fn stop_listening(&self) {
        let remotes = self.remotes();
        self.release(remotes, None, None);
    }

    /// Release this hub's subscriptions on `other`, narrowed by `names` and
    /// `callback` when given. Does nothing while this hub listens to no one.
    pub fn stop_listening_to<Q: 'static>(
        &self,
        other: &EventHub<Q>,
        names: Option<&str>,
        callback: Option<&Callback<Q>>,
    ) {
        if self.listening_count() == 0 {
            return;
        }
        let remote: Weak<HubInner<Q>> = Rc::downgrade(&other.inner);
        let remote: Weak<dyn Remote> = remote;
        let remotes = vec![(other.listen_id().clone(), remote)];
        self.release(remotes, names, callback.map(|cb| cb as &dyn Any));
    }

    /// Release this hub's subscriptions to `names` on every remembered hub.
    pub fn stop_listening_event(&self, names: &str) {
        let remotes = self.remotes();
        self.release(remotes, Some(names), None);
    }

    /// Release `callback` on every remembered hub, optionally only under
    /// `names`.
    pub fn stop_listening_callback<Q: 'static>(
        &self,
        names: Option<&str>,
        callback: &Callback<Q>,
    ) {
        let remotes = self.remotes();
        self.release(remotes, names, Some(callback as &dyn Any));
    }

    fn remotes(&self) -> Vec<(ListenerId, Weak<dyn Remote>)> {
        self.inner
            .state
            .borrow()
            .listening_to
            .iter()
            .map(|(id, remote)| (id.clone(), Weak::clone(remote)))
            .collect()
    }

    fn release(
        &self,
        remotes: Vec<(ListenerId, Weak<dyn Remote>)>,
        names: Option<&str>,
        callback: Option<&dyn Any>,
    ) {
        let unconditional = names.is_none() && callback.is_none();
        let me = self.listen_id().clone();

        for (id, remote) in remotes {
            let forget = match remote.upgrade() {
                Some(remote) => {
                    remote.release(names, callback, &me);
                    unconditional || remote.is_idle()
                }
                None => true,
            };
            if forget {
                self.inner.state.borrow_mut().listening_to.remove(&id);
                trace!(listener = %me, remote = %id, "Stopped listening");
            }
        }
    }

    /// Check whether the hub has no listeners at all.
    pub fn is_empty(&self) -> bool {
        self.inner.state.borrow().subscriptions.is_empty()
    }

    /// Number of listeners registered under exactly `name`.
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .state
            .borrow()
            .subscriptions
            .get(name)
            .map_or(0, Vec::len)
    }

    /// Check whether any listener is registered under exactly `name`.
    pub fn has_listeners(&self, name: &str) -> bool {
        self.listener_count(name) > 0
    }

    /// Names that currently have listeners, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .state
            .borrow()
            .subscriptions
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of remote hubs this hub remembers listening to.
    pub fn listening_count(&self) -> usize {
        self.inner.state.borrow().listening_to.len()
    }

    /// Check whether this hub remembers listening to `other`.
    pub fn is_listening_to<Q: 'static>(&self, other: &EventHub<Q>) -> bool {
        self.inner
            .state
            .borrow()
            .listening_to
            .contains_key(other.listen_id())
    }
}

impl<P: 'static> fmt::Debug for EventHub<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("listen_id", &self.inner.listen_id.get())
            .field("events", &self.event_names())
            .field("listening_to", &self.listening_count())
            .finish()
    }
}
