//! Wildcard listeners for logging and recording events.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use crate::hub::{ALL, Callback, Event, EventHub};

/// A wildcard listener that logs every event through `tracing`.
#[derive(Debug, Clone)]
pub struct EventLogger {
    /// Level events are logged at.
    pub log_level: tracing::Level,
}

impl EventLogger {
    /// Create a new event logger.
    pub fn new() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }

    /// Attach to `hub`. The returned handle detaches it again via
    /// [`EventHub::unsubscribe`].
    pub fn attach<P: 'static>(&self, hub: &EventHub<P>) -> Callback<P> {
        let level = self.log_level;
        let callback = Callback::new(move |event: &Event<'_, P>| {
            log_event(level, event.name, event.context.as_str());
        });
        hub.subscribe(ALL, &callback, None, false);
        callback
    }
}

impl Default for EventLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(level: tracing::Level, name: &str, context: &str) {
    if level == tracing::Level::ERROR {
        tracing::error!(event = name, context = context, "Event");
    } else if level == tracing::Level::WARN {
        tracing::warn!(event = name, context = context, "Event");
    } else if level == tracing::Level::INFO {
        tracing::info!(event = name, context = context, "Event");
    } else if level == tracing::Level::DEBUG {
        tracing::debug!(event = name, context = context, "Event");
    } else {
        tracing::trace!(event = name, context = context, "Event");
    }
}

/// An event captured by an [`EventRecorder`].
#[derive(Debug, Clone)]
pub struct RecordedEvent<D> {
    /// When the event was seen.
    pub at: Instant,
    /// Event name.
    pub name: String,
    /// Summary of the payload.
    pub detail: D,
}

/// A bounded wildcard listener that keeps events for later inspection.
///
/// Clones share the same storage.
pub struct EventRecorder<D = String> {
    events: Rc<RefCell<Vec<RecordedEvent<D>>>>,
    max_events: usize,
}

impl<D> Clone for EventRecorder<D> {
    fn clone(&self) -> Self {
        Self {
            events: Rc::clone(&self.events),
            max_events: self.max_events,
        }
    }
}

impl<D: Clone + 'static> EventRecorder<D> {
    /// Create a recorder keeping at most `max_events` events.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
            max_events,
        }
    }

    /// Attach to `hub`, summarizing each event with `summarize`.
    pub fn attach_with<P: 'static>(
        &self,
        hub: &EventHub<P>,
        summarize: impl Fn(&Event<'_, P>) -> D + 'static,
    ) -> Callback<P> {
        let events = Rc::clone(&self.events);
        let max_events = self.max_events;
        let callback = Callback::new(move |event: &Event<'_, P>| {
            let mut events = events.borrow_mut();
            if events.len() < max_events {
                events.push(RecordedEvent {
                    at: Instant::now(),
                    name: event.name.to_string(),
                    detail: summarize(event),
                });
            }
        });
        hub.subscribe(ALL, &callback, None, false);
        callback
    }

    /// Get recorded events.
    pub fn events(&self) -> Vec<RecordedEvent<D>> {
        self.events.borrow().clone()
    }

    /// Names of recorded events, in order.
    pub fn names(&self) -> Vec<String> {
        self.events.borrow().iter().map(|e| e.name.clone()).collect()
    }

    /// Clear recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }
}

impl EventRecorder<String> {
    /// Attach to `hub`, summarizing payloads with their `Debug` output.
    pub fn attach<P: fmt::Debug + 'static>(&self, hub: &EventHub<P>) -> Callback<P> {
        self.attach_with(hub, |event| format!("{:?}", event.payload))
    }
}

impl<D> fmt::Debug for EventRecorder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRecorder")
            .field("len", &self.events.borrow().len())
            .field("max_events", &self.max_events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_captures_in_order() {
        let hub: EventHub<u32> = EventHub::new();
        let recorder: EventRecorder = EventRecorder::new(100);
        recorder.attach(&hub);

        hub.dispatch("a b", &1);
        hub.dispatch("c", &2);

        assert_eq!(recorder.names(), vec!["a", "b", "c"]);
        assert_eq!(recorder.events()[2].detail, "2");
    }

    #[test]
    fn test_recorder_max_events() {
        let hub: EventHub<u32> = EventHub::new();
        let recorder: EventRecorder = EventRecorder::new(2);
        recorder.attach(&hub);

        for i in 0..5 {
            hub.dispatch("tick", &i);
        }

        assert_eq!(recorder.len(), 2); // Should be capped at max
    }

    #[test]
    fn test_recorder_detach() {
        let hub: EventHub<u32> = EventHub::new();
        let recorder: EventRecorder<u32> = EventRecorder::new(10);
        let handle = recorder.attach_with(&hub, |event| *event.payload * 10);

        hub.dispatch("tick", &1);
        hub.unsubscribe(Some(ALL), Some(&handle), None);
        hub.dispatch("tick", &2);

        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.events()[0].detail, 10);
    }

    #[test]
    fn test_logger_attaches_as_wildcard() {
        let hub: EventHub<()> = EventHub::new();
        let handle = EventLogger::new()
            .with_level(tracing::Level::TRACE)
            .attach(&hub);

        assert_eq!(hub.listener_count(ALL), 1);
        hub.dispatch("anything", &());
        hub.unsubscribe(None, Some(&handle), None);
        assert!(hub.is_empty());
    }
}
