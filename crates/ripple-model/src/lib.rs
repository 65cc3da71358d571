//! Ripple Model - Observable Attribute Records
//!
//! This crate provides the record layer of the Ripple runtime. It includes:
//!
//! - [`Model`]: a map of JSON attributes that publishes change events
//! - [`ModelConfig`]: per-kind id attribute, defaults, validator and backend
//! - [`Validator`]: validation hook, with [`RequiredKeys`], [`TypeRules`] and
//!   [`ValidatorChain`] built in
//! - [`SyncBackend`]: persistence contract, with the in-process
//!   [`MemoryBackend`]
//!
//! # Quick Start
//!
//! ```ignore
//! use ripple_model::prelude::*;
//!
//! let kind = Rc::new(
//!     ModelConfig::new()
//!         .with_default("done", false)
//!         .with_validator(RequiredKeys::new(["title"])),
//! );
//!
//! let todo = Model::with_config(kind, json!({"title": "write docs"}));
//! todo.on("change:done", &render);
//! todo.set_with("done", true, SetOptions::validated())?;
//! ```
//!
//! # Events
//!
//! | Event            | When                                              |
//! |------------------|---------------------------------------------------|
//! | `change:<key>`   | one attribute changed                             |
//! | `change`         | the outermost mutation changed anything           |
//! | `invalid`        | the validator rejected a mutation                 |
//! | `sync`           | the backend served a request                      |
//! | `error`          | the backend failed a request                      |
//! | `destroy`        | the record was destroyed                          |

pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod options;
pub mod sync;
pub mod validator;

// Re-export main types at crate root
pub use config::{DEFAULT_ID_ATTRIBUTE, ModelConfig};
pub use error::{ModelError, ModelResult, SyncError, SyncResult, ValidationError};
pub use event::{CHANGE, DESTROY, ERROR, INVALID, ModelEvent, SYNC, change_event};
pub use model::{Model, WeakModel};
pub use options::{Attributes, Patch, SetOptions};
pub use sync::{MemoryBackend, SyncBackend, SyncMethod};
pub use validator::{RequiredKeys, SharedValidator, TypeRules, Validator, ValidatorChain, ValueKind};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::ModelConfig;
    pub use crate::error::{ModelError, ModelResult, ValidationError};
    pub use crate::event::ModelEvent;
    pub use crate::model::{Model, WeakModel};
    pub use crate::options::{Attributes, Patch, SetOptions};
    pub use crate::sync::{MemoryBackend, SyncBackend, SyncMethod};
    pub use crate::validator::{RequiredKeys, TypeRules, Validator, ValidatorChain, ValueKind};

    pub use ripple_events::prelude::*;
    pub use serde_json::{Value, json};
    pub use std::rc::Rc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::cell::RefCell;

    #[test]
    fn test_listener_sees_consistent_state() {
        let model = Model::new(json!({"first": "a", "last": "b"}));
        let seen = Rc::new(RefCell::new(Vec::new()));

        let weak = model.downgrade();
        let sink = Rc::clone(&seen);
        model.on(
            "change:first change:last",
            &Callback::new(move |_event: &Event<'_, ModelEvent>| {
                if let Some(model) = weak.upgrade() {
                    sink.borrow_mut().push(model.to_json());
                }
            }),
        );

        model
            .mutate(json!({"first": "x", "last": "y"}), SetOptions::default())
            .unwrap();

        // Every key is applied before the first listener runs.
        let expected = match json!({"first": "x", "last": "y"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        assert_eq!(*seen.borrow(), vec![expected.clone(), expected]);
    }

    #[test]
    fn test_views_listen_to_models() {
        let model = Model::new(json!({"count": 0}));
        let view: EventHub<()> = EventHub::new();
        let renders = Rc::new(RefCell::new(0));

        let counter = Rc::clone(&renders);
        view.listen_to(
            &model,
            "change",
            &Callback::new(move |_event: &Event<'_, ModelEvent>| *counter.borrow_mut() += 1),
        );

        model.set("count", 1).unwrap();
        view.stop_listening();
        model.set("count", 2).unwrap();

        assert_eq!(*renders.borrow(), 1);
        assert!(model.hub().is_empty());
    }

    #[test]
    fn test_custom_events_use_same_hub() {
        let model = Model::new(Patch::none());
        let payloads = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&payloads);
        model.once(
            "ping",
            &Callback::new(move |event: &Event<'_, ModelEvent>| {
                sink.borrow_mut().push(event.payload.summary())
            }),
        );

        model.trigger("ping", &ModelEvent::Custom(json!(1)));
        model.trigger("ping", &ModelEvent::Custom(json!(2)));

        assert_eq!(*payloads.borrow(), vec![json!(1)]);
    }
}
