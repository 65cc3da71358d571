//! # Ripple - Observer and Data-Binding Runtime
//!
//! Ripple gives any Rust type publish/subscribe events, and builds observable
//! attribute records on top of them.
//!
//! ## Features
//!
//! - **Events**: named, synchronous, ordered dispatch with wildcard and
//!   one-shot listeners
//! - **Inversion of Control**: entities listen to each other and release
//!   everything with one call
//! - **Observable Records**: per-attribute and aggregate change events, with
//!   nested mutations coalesced into one transaction
//! - **Validation and Persistence**: pluggable validators and sync backends
//!
//! ## Quick Start
//!
//! ```ignore
//! use ripple::prelude::*;
//!
//! let todos = Ripple::builder()
//!     .with_default("done", false)
//!     .with_required(["title"])
//!     .with_type("done", ValueKind::Bool)
//!     .build()?;
//!
//! let todo = todos.create(json!({"title": "write docs"}));
//! todo.on("change:done", &render);
//! todo.set_with("done", true, SetOptions::validated())?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Your Application              │
//! ├─────────────────────────────────────────────┤
//! │                ripple (facade)              │
//! │        Ripple builder  ->  ModelKind        │
//! ├──────────────────────┬──────────────────────┤
//! │     ripple-model     │    ripple-events     │
//! │ (records, validation,│ (hub, listen_to,     │
//! │  sync backends)      │  logging, recording) │
//! └──────────────────────┴──────────────────────┘
//! ```

use std::rc::Rc;

use ripple_events::{EventLogger, Events};
use ripple_model::{
    Attributes, Model, ModelConfig, ModelError, Patch, RequiredKeys, SetOptions, SyncBackend,
    TypeRules, Validator, ValidatorChain, ValueKind,
};
use serde_json::Value;
use tracing::debug;

// Re-export from sub-crates
pub use ripple_events;
pub use ripple_model;

/// Main entry point for Ripple.
pub struct Ripple;

impl Ripple {
    /// Create a new record kind builder.
    pub fn builder() -> RippleBuilder {
        RippleBuilder::new()
    }

    /// Create a record of the default kind.
    pub fn model(attrs: impl Into<Patch>) -> Model {
        Model::new(attrs)
    }
}

/// Builder for a record kind.
pub struct RippleBuilder {
    config: ModelConfig,
    required: Vec<String>,
    types: TypeRules,
    validators: ValidatorChain,
    event_logger: Option<EventLogger>,
}

impl RippleBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ModelConfig::default(),
            required: Vec::new(),
            types: TypeRules::new(),
            validators: ValidatorChain::new(),
            event_logger: None,
        }
    }

    // Attributes

    /// Set the identity attribute.
    pub fn with_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.config.id_attribute = name.into();
        self
    }

    /// Add one default attribute.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.defaults.insert(key.into(), value.into());
        self
    }

    /// Add several default attributes.
    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.config.defaults.extend(defaults);
        self
    }

    // Validation

    /// Require attributes to be present and non-null.
    pub fn with_required<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Constrain the kind of an attribute.
    pub fn with_type(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.types = self.types.with(key, kind);
        self
    }

    /// Add a custom validator. Validators run after the required-key and
    /// type checks, in the order they were added.
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators = self.validators.with(validator);
        self
    }

    // Persistence

    /// Set the sync backend.
    pub fn with_backend<B: SyncBackend + 'static>(mut self, backend: B) -> Self {
        self.config.backend = Some(Rc::new(backend));
        self
    }

    // Observability

    /// Trace every event of every record at `level`.
    pub fn with_event_logger(mut self, level: tracing::Level) -> Self {
        self.event_logger = Some(EventLogger::new().with_level(level));
        self
    }

    /// Build the record kind.
    pub fn build(self) -> Result<ModelKind, RippleError> {
        let mut config = self.config;
        if config.id_attribute.trim().is_empty() {
            return Err(RippleError::InvalidConfig(
                "id attribute must not be empty".to_string(),
            ));
        }

        let mut chain = ValidatorChain::new();
        if !self.required.is_empty() {
            chain = chain.with(RequiredKeys::new(self.required));
        }
        if !self.types.is_empty() {
            chain = chain.with(self.types);
        }
        if !self.validators.is_empty() {
            chain = chain.with(self.validators);
        }
        if !chain.is_empty() {
            config.validator = Some(Rc::new(chain));
        }

        debug!(
            id_attribute = %config.id_attribute,
            defaults = config.defaults.len(),
            validated = config.validator.is_some(),
            "Built model kind"
        );

        Ok(ModelKind {
            config: Rc::new(config),
            event_logger: self.event_logger,
        })
    }
}

impl Default for RippleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A configured record kind: a factory for records that share one
/// configuration.
#[derive(Clone)]
pub struct ModelKind {
    config: Rc<ModelConfig>,
    event_logger: Option<EventLogger>,
}

impl ModelKind {
    /// Get the kind's configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Create a record. The initial attributes are not validated.
    pub fn create(&self, attrs: impl Into<Patch>) -> Model {
        let model = Model::with_config(Rc::clone(&self.config), attrs);
        self.observe(&model);
        model
    }

    /// Create a record, validating the initial attributes when
    /// `options.validate` is set.
    pub fn try_create(
        &self,
        attrs: impl Into<Patch>,
        options: SetOptions,
    ) -> Result<Model, RippleError> {
        let model = Model::try_with_config(Rc::clone(&self.config), attrs, options)?;
        self.observe(&model);
        Ok(model)
    }

    fn observe(&self, model: &Model) {
        if let Some(logger) = &self.event_logger {
            logger.attach(model.hub());
        }
    }
}

impl std::fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelKind")
            .field("config", &self.config)
            .field("event_logger", &self.event_logger)
            .finish()
    }
}

/// Errors from the Ripple facade.
#[derive(Debug, thiserror::Error)]
pub enum RippleError {
    /// The kind's configuration is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record error.
    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{ModelKind, Ripple, RippleBuilder, RippleError};

    // Event types
    pub use ripple_events::{
        ALL, Callback, Event, EventHub, EventLogger, EventRecorder, Events, ListenerId,
    };

    // Record types
    pub use ripple_model::{
        Attributes, MemoryBackend, Model, ModelConfig, ModelError, ModelEvent, Patch,
        RequiredKeys, SetOptions, SyncBackend, SyncMethod, TypeRules, ValidationError, Validator,
        ValidatorChain, ValueKind, WeakModel,
    };

    // Common types
    pub use serde_json::{Value, json};
    pub use std::rc::Rc;
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::cell::RefCell;

    #[test]
    fn test_ripple_builder() {
        let kind = Ripple::builder()
            .with_id_attribute("_id")
            .with_default("done", false)
            .with_required(["title"])
            .with_type("done", ValueKind::Bool)
            .build()
            .unwrap();

        assert_eq!(kind.config().id_attribute, "_id");
        assert!(kind.config().validator.is_some());

        let todo = kind.create(json!({"title": "a"}));
        assert_eq!(todo.get("done"), Some(json!(false)));
        assert!(todo.is_new());
    }

    #[test]
    fn test_empty_id_attribute_is_rejected() {
        let err = Ripple::builder().with_id_attribute(" ").build().unwrap_err();
        assert!(matches!(err, RippleError::InvalidConfig(_)));
    }

    #[test]
    fn test_validators_run_in_order() {
        let kind = Ripple::builder()
            .with_required(["title"])
            .with_type("title", ValueKind::String)
            .with_validator(|attrs: &Attributes, _: &SetOptions| {
                let too_long = attrs
                    .get("title")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.len() > 5);
                too_long.then(|| ValidationError::for_key("title", "too long"))
            })
            .build()
            .unwrap();

        let err = kind
            .try_create(json!({}), SetOptions::validated())
            .unwrap_err();
        assert_eq!(err.to_string(), "Model error: Validation failed: title: is required");

        let todo = kind.create(json!({"title": "ok"}));
        let err = todo
            .set_with("title", 5, SetOptions::validated())
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: title: must be a string");

        let err = todo
            .set_with("title", "much too long", SetOptions::validated())
            .unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: title: too long");
        assert_eq!(todo.get("title"), Some(json!("ok")));
    }

    #[test]
    fn test_end_to_end_change_trace() {
        let kind = Ripple::builder()
            .with_event_logger(tracing::Level::TRACE)
            .build()
            .unwrap();
        let model = kind.create(json!({"name": "x"}));
        let recorder: EventRecorder = EventRecorder::new(16);
        recorder.attach(model.hub());

        model.mutate(json!({"name": "y"}), SetOptions::default()).unwrap();

        assert_eq!(recorder.names(), vec!["change:name", "change"]);
        assert_eq!(
            model.changed_attributes(None),
            json!({"name": "y"}).as_object().cloned()
        );
        assert_eq!(model.previous("name"), Some(json!("x")));
        // Logger and recorder are both wildcard listeners.
        assert_eq!(model.hub().listener_count(ALL), 2);
    }

    #[test]
    fn test_kind_with_memory_backend() {
        let backend = Rc::new(MemoryBackend::new());
        let kind = Ripple::builder()
            .with_backend(Rc::clone(&backend))
            .with_required(["title"])
            .build()
            .unwrap();

        let todo = kind.create(json!({"title": "persist me"}));
        let synced = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&synced);
        todo.on(
            "sync",
            &Callback::new(move |_event: &Event<'_, ModelEvent>| *counter.borrow_mut() += 1),
        );

        todo.save(Patch::none(), SetOptions::default()).unwrap();
        todo.destroy(SetOptions::default()).unwrap();

        assert_eq!(*synced.borrow(), 2);
        assert!(backend.is_empty());
        assert_eq!(backend.requests(), vec![SyncMethod::Create, SyncMethod::Delete]);
    }
}
