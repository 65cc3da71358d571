//! The observable record.
//!
//! A [`Model`] is a map of JSON attributes that publishes an event whenever
//! one of them changes. Every write goes through [`Model::mutate`], which
//! validates, diffs, applies, and then notifies listeners.
//!
//! # Change tracking
//!
//! Two notions of "changed" are kept apart:
//!
//! - Each call fires `"change:<key>"` for the keys whose value differs from
//!   the *current* value.
//! - [`Model::changed_attributes`] reports the keys that differ from the
//!   snapshot taken when the *outermost* mutation began. A nested mutation
//!   that puts a value back removes the key from that set again.
//!
//! Listeners may call [`Model::mutate`] while it is notifying. Such nested
//! calls fire their own `"change:<key>"` events, but only the outermost call
//! fires `"change"`, once per round until no listener changes anything more.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde_json::Value;
use tracing::{debug, trace};

use ripple_events::{EventHub, Events, unique_id};

use crate::config::ModelConfig;
use crate::error::{ModelError, ModelResult, ValidationError};
use crate::event::{CHANGE, INVALID, ModelEvent, change_event};
use crate::options::{Attributes, Patch, SetOptions};

/// Prefix of client ids.
pub const CID_PREFIX: &str = "c";

#[derive(Default)]
struct ModelState {
    id: Option<Value>,
    attributes: Attributes,
    /// Differences from `previous`. Removed keys are recorded as `null`.
    changed: Attributes,
    /// Snapshot taken when the outermost mutation began.
    previous: Attributes,
    validation_error: Option<ValidationError>,
    /// Number of `mutate` calls currently on the stack.
    depth: usize,
    /// Options of the latest notifying call not yet announced by `"change"`.
    pending: Option<SetOptions>,
}

struct ModelInner {
    hub: EventHub<ModelEvent>,
    config: Rc<ModelConfig>,
    cid: String,
    state: RefCell<ModelState>,
}

/// Leaves one level of mutation nesting when dropped.
struct Nesting<'a> {
    state: &'a RefCell<ModelState>,
}

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        // Listeners have returned or unwound by now, releasing their borrows.
        let mut state = self.state.borrow_mut();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.pending = None;
        }
    }
}

/// An observable attribute record.
///
/// `Model` is a shared handle: clones refer to the same record. Listeners
/// that need the record should hold a [`WeakModel`] to avoid keeping it alive
/// through its own hub.
///
/// # Example
///
/// ```
/// use ripple_events::{Callback, Event, Events};
/// use ripple_model::{Model, ModelEvent};
/// use serde_json::json;
///
/// let model = Model::new(json!({"name": "x"}));
/// let log = Callback::new(|event: &Event<'_, ModelEvent>| println!("{}", event.name));
/// model.on("change:name change", &log);
///
/// model.set("name", "y").unwrap();
/// assert_eq!(model.previous("name"), Some(json!("x")));
/// ```
#[derive(Clone)]
pub struct Model {
    inner: Rc<ModelInner>,
}

impl Model {
    /// Create a record with the default configuration.
    pub fn new(attrs: impl Into<Patch>) -> Self {
        Self::with_config(Rc::new(ModelConfig::default()), attrs)
    }

    /// Create a record of the kind described by `config`.
    ///
    /// Attributes not given in `attrs` are taken from the kind's defaults.
    /// The initial attributes are not validated and count as unchanged.
    pub fn with_config(config: Rc<ModelConfig>, attrs: impl Into<Patch>) -> Self {
        let model = Self::blank(config);
        let attrs = model.with_defaults(attrs.into());
        model.apply(attrs, &SetOptions::default());
        model.inner.state.borrow_mut().changed.clear();
        model
    }

    /// Create a record, running the kind's validator first when
    /// `options.validate` is set.
    pub fn try_with_config(
        config: Rc<ModelConfig>,
        attrs: impl Into<Patch>,
        options: SetOptions,
    ) -> ModelResult<Self> {
        let model = Self::blank(config);
        let attrs = model.with_defaults(attrs.into());
        model.mutate(attrs, options)?;
        model.inner.state.borrow_mut().changed.clear();
        Ok(model)
    }

    fn blank(config: Rc<ModelConfig>) -> Self {
        let model = Self {
            inner: Rc::new(ModelInner {
                hub: EventHub::new(),
                config,
                cid: unique_id(CID_PREFIX),
                state: RefCell::new(ModelState::default()),
            }),
        };
        debug!(cid = %model.inner.cid, "Created model");
        model
    }

    fn with_defaults(&self, patch: Patch) -> Attributes {
        let mut attrs = patch.into_attributes().unwrap_or_default();
        for (key, value) in &self.inner.config.defaults {
            if !attrs.contains_key(key) {
                attrs.insert(key.clone(), value.clone());
            }
        }
        attrs
    }

    /// Client id, unique within the process.
    pub fn cid(&self) -> &str {
        &self.inner.cid
    }

    /// Server id: the value of the id attribute, if set.
    pub fn id(&self) -> Option<Value> {
        self.inner.state.borrow().id.clone()
    }

    /// The kind's configuration.
    pub fn config(&self) -> &ModelConfig {
        &self.inner.config
    }

    pub(crate) fn shared_config(&self) -> Rc<ModelConfig> {
        Rc::clone(&self.inner.config)
    }

    /// Check whether both handles refer to the same record.
    pub fn same_as(&self, other: &Model) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a non-owning handle.
    pub fn downgrade(&self) -> WeakModel {
        WeakModel {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Set one attribute.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> ModelResult<&Self> {
        self.mutate((key.into(), value.into()), SetOptions::default())
    }

    /// Set one attribute with explicit options.
    pub fn set_with(
        &self,
        key: impl Into<String>,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> ModelResult<&Self> {
        self.mutate((key.into(), value.into()), options)
    }

    /// Set several attributes at once.
    pub fn set_all(&self, attrs: Attributes, options: SetOptions) -> ModelResult<&Self> {
        self.mutate(attrs, options)
    }

    /// Remove one attribute.
    pub fn unset(&self, key: impl Into<String>, options: SetOptions) -> ModelResult<&Self> {
        self.mutate((key.into(), Value::Null), options.with_unset(true))
    }

    /// Remove every attribute.
    pub fn clear(&self, options: SetOptions) -> ModelResult<&Self> {
        let attrs: Attributes = self
            .inner
            .state
            .borrow()
            .attributes
            .keys()
            .map(|key| (key.clone(), Value::Null))
            .collect();
        self.mutate(attrs, options.with_unset(true))
    }

    /// The single entry point for changing attributes.
    ///
    /// An empty patch does nothing. With `options.validate` set and a
    /// validator configured, a rejected candidate emits `"invalid"` and
    /// returns [`ModelError::Invalid`] without touching any state. Otherwise
    /// the patch is applied and, unless `options.silent` is set, listeners
    /// are notified before this returns.
    pub fn mutate(&self, patch: impl Into<Patch>, options: SetOptions) -> ModelResult<&Self> {
        let Some(attrs) = patch.into().into_attributes() else {
            return Ok(self);
        };
        self.check(&attrs, &options)?;
        self.apply(attrs, &options);
        Ok(self)
    }

    /// Validation gate. Records the outcome in `validation_error`.
    pub(crate) fn check(&self, attrs: &Attributes, options: &SetOptions) -> ModelResult<()> {
        if !options.validate {
            return Ok(());
        }
        let Some(validator) = self.inner.config.validator.clone() else {
            return Ok(());
        };

        let candidate = {
            let state = self.inner.state.borrow();
            let mut candidate = state.attributes.clone();
            for (key, value) in attrs {
                if options.unset {
                    candidate.shift_remove(key);
                } else {
                    candidate.insert(key.clone(), value.clone());
                }
            }
            candidate
        };

        let outcome = validator.validate(&candidate, options);
        self.inner.state.borrow_mut().validation_error = outcome.clone();
        let Some(error) = outcome else {
            return Ok(());
        };

        debug!(cid = %self.inner.cid, error = %error, "Validation failed");
        let mut options = options.clone();
        options.validation_error = Some(error.clone());
        self.inner.hub.emit(
            INVALID,
            &ModelEvent::Invalid {
                model: self.clone(),
                error: error.clone(),
                options,
            },
        );
        Err(ModelError::Invalid(error))
    }

    fn apply(&self, attrs: Attributes, options: &SetOptions) {
        let (outermost, changes) = {
            let mut guard = self.inner.state.borrow_mut();
            let state = &mut *guard;
            let outermost = state.depth == 0;
            state.depth += 1;

            if outermost {
                state.previous = state.attributes.clone();
                state.changed.clear();
            }

            let touches_id = attrs.contains_key(&self.inner.config.id_attribute);
            let mut changes = Vec::new();

            for (key, value) in attrs {
                let incoming = if options.unset { None } else { Some(&value) };

                if state.attributes.get(&key) != incoming {
                    changes.push(key.clone());
                }
                if state.previous.get(&key) != incoming {
                    let recorded = incoming.cloned().unwrap_or(Value::Null);
                    state.changed.insert(key.clone(), recorded);
                } else {
                    state.changed.shift_remove(&key);
                }

                if options.unset {
                    state.attributes.shift_remove(&key);
                } else {
                    state.attributes.insert(key, value);
                }
            }

            if touches_id {
                state.id = state
                    .attributes
                    .get(&self.inner.config.id_attribute)
                    .cloned();
            }

            (outermost, changes)
        };
        let _nesting = Nesting {
            state: &self.inner.state,
        };

        trace!(
            cid = %self.inner.cid,
            outermost = outermost,
            changes = changes.len(),
            "Applied mutation"
        );

        if options.silent {
            return;
        }

        if !changes.is_empty() {
            self.inner.state.borrow_mut().pending = Some(options.clone());
        }
        for key in changes {
            let value = self.get(&key);
            self.inner.hub.emit(
                &change_event(&key),
                &ModelEvent::Change {
                    model: self.clone(),
                    key,
                    value,
                    options: options.clone(),
                },
            );
        }

        if !outermost {
            return;
        }

        loop {
            let pending = self.inner.state.borrow_mut().pending.take();
            let Some(options) = pending else {
                break;
            };
            self.inner.hub.emit(
                CHANGE,
                &ModelEvent::Changed {
                    model: self.clone(),
                    options,
                },
            );
        }
    }

    /// Current value of an attribute.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().attributes.get(key).cloned()
    }

    /// Check whether an attribute is present and not null.
    pub fn has(&self, key: &str) -> bool {
        self.inner
            .state
            .borrow()
            .attributes
            .get(key)
            .is_some_and(|value| !value.is_null())
    }

    /// HTML-escaped string form of an attribute. Absent and null attributes
    /// escape to the empty string.
    pub fn escape(&self, key: &str) -> String {
        let raw = match self.get(key) {
            None | Some(Value::Null) => return String::new(),
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
        };
        escape_html(&raw)
    }

    /// Attributes that changed during the last outermost mutation, or, with
    /// `diff`, the entries of `diff` that differ from the record.
    ///
    /// While a mutation is notifying, `diff` is compared with the snapshot
    /// taken when it began. Returns `None` when nothing differs.
    pub fn changed_attributes(&self, diff: Option<&Attributes>) -> Option<Attributes> {
        let state = self.inner.state.borrow();
        let Some(diff) = diff else {
            return (!state.changed.is_empty()).then(|| state.changed.clone());
        };

        let old = if state.depth > 0 {
            &state.previous
        } else {
            &state.attributes
        };
        let changed: Attributes = diff
            .iter()
            .filter(|(key, value)| old.get(key.as_str()) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        (!changed.is_empty()).then_some(changed)
    }

    /// Value of an attribute when the last outermost mutation began.
    pub fn previous(&self, key: &str) -> Option<Value> {
        self.inner.state.borrow().previous.get(key).cloned()
    }

    /// All attributes as they were when the last outermost mutation began.
    pub fn previous_attributes(&self) -> Attributes {
        self.inner.state.borrow().previous.clone()
    }

    /// Check whether the last outermost mutation changed `key`, or anything
    /// when `key` is `None`.
    pub fn has_changed(&self, key: Option<&str>) -> bool {
        let state = self.inner.state.borrow();
        match key {
            Some(key) => state.changed.contains_key(key),
            None => !state.changed.is_empty(),
        }
    }

    /// The failure recorded by the last validation, if it failed.
    pub fn validation_error(&self) -> Option<ValidationError> {
        self.inner.state.borrow().validation_error.clone()
    }

    /// Run the validator against the current attributes.
    ///
    /// Emits `"invalid"` on failure. Always valid without a validator.
    pub fn is_valid(&self) -> bool {
        self.check(&Attributes::new(), &SetOptions::validated())
            .is_ok()
    }

    /// Check whether the record has never been persisted, i.e. has no id
    /// attribute.
    pub fn is_new(&self) -> bool {
        !self.has(&self.inner.config.id_attribute)
    }

    /// Copy of the attributes.
    pub fn to_json(&self) -> Attributes {
        self.inner.state.borrow().attributes.clone()
    }

    /// A new record of the same kind with the same attributes.
    pub fn duplicate(&self) -> Model {
        Model::with_config(self.shared_config(), self.to_json())
    }

    /// Attribute names, in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner.state.borrow().attributes.keys().cloned().collect()
    }

    /// Attribute values, in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.inner
            .state
            .borrow()
            .attributes
            .values()
            .cloned()
            .collect()
    }

    /// `(name, value)` pairs, in insertion order.
    pub fn pairs(&self) -> Vec<(String, Value)> {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Map from each value's string form to its attribute name. Later
    /// attributes win when values collide.
    pub fn invert(&self) -> Attributes {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .map(|(key, value)| {
                let name = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name, Value::String(key.clone()))
            })
            .collect()
    }

    /// Only the named attributes.
    pub fn pick(&self, keys: &[&str]) -> Attributes {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .filter(|(key, _)| keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Every attribute except the named ones.
    pub fn omit(&self, keys: &[&str]) -> Attributes {
        self.inner
            .state
            .borrow()
            .attributes
            .iter()
            .filter(|(key, _)| !keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Swap in `attrs` as the current attributes, returning the old ones.
    /// No events, no change tracking.
    pub(crate) fn replace_attributes(&self, attrs: Attributes) -> Attributes {
        std::mem::replace(&mut self.inner.state.borrow_mut().attributes, attrs)
    }
}

impl Events<ModelEvent> for Model {
    fn hub(&self) -> &EventHub<ModelEvent> {
        &self.inner.hub
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.try_borrow();
        let mut debug = f.debug_struct("Model");
        debug.field("cid", &self.inner.cid);
        if let Ok(state) = state {
            debug
                .field("id", &state.id)
                .field("attributes", &state.attributes);
        }
        debug.finish()
    }
}

/// A non-owning [`Model`] handle.
#[derive(Clone, Default)]
pub struct WeakModel {
    inner: Weak<ModelInner>,
}

impl WeakModel {
    /// Get the record back, if it is still alive.
    pub fn upgrade(&self) -> Option<Model> {
        self.inner.upgrade().map(|inner| Model { inner })
    }
}

impl fmt::Debug for WeakModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakModel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '`' => escaped.push_str("&#x60;"),
            c => escaped.push(c),
        }
    }
    escaped
}
