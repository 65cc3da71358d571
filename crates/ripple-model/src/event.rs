//! Payloads of events published by records.

use serde_json::Value;

use crate::error::ValidationError;
use crate::model::Model;
use crate::options::{Attributes, SetOptions};

/// Prefix of per-attribute change events: `"change:<key>"`.
pub const CHANGE_PREFIX: &str = "change:";

/// Name of the aggregate change event.
pub const CHANGE: &str = "change";

/// Name of the event fired when validation rejects a mutation.
pub const INVALID: &str = "invalid";

/// Name of the event fired when a record is destroyed.
pub const DESTROY: &str = "destroy";

/// Name of the event fired after a successful backend round trip.
pub const SYNC: &str = "sync";

/// Name of the event fired when a backend request fails.
pub const ERROR: &str = "error";

/// Per-attribute change event name.
pub fn change_event(key: &str) -> String {
    format!("{}{}", CHANGE_PREFIX, key)
}

/// Event payload published on a record's hub.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    /// `"change:<key>"`: one attribute changed. `value` is the attribute's
    /// value when the event fires, `None` once it has been removed.
    Change {
        model: Model,
        key: String,
        value: Option<Value>,
        options: SetOptions,
    },

    /// `"change"`: one or more attributes changed during the outermost
    /// mutation.
    Changed { model: Model, options: SetOptions },

    /// `"invalid"`: the validator rejected a mutation.
    Invalid {
        model: Model,
        error: ValidationError,
        options: SetOptions,
    },

    /// `"destroy"`: the record was destroyed.
    Destroy { model: Model, options: SetOptions },

    /// `"sync"`: the backend accepted a request.
    Sync {
        model: Model,
        response: Option<Attributes>,
        options: SetOptions,
    },

    /// `"error"`: the backend rejected a request.
    Error {
        model: Model,
        error: String,
        options: SetOptions,
    },

    /// Any event triggered by user code.
    Custom(Value),
}

impl ModelEvent {
    /// The record that published the event, if it is a built-in event.
    pub fn model(&self) -> Option<&Model> {
        match self {
            ModelEvent::Change { model, .. }
            | ModelEvent::Changed { model, .. }
            | ModelEvent::Invalid { model, .. }
            | ModelEvent::Destroy { model, .. }
            | ModelEvent::Sync { model, .. }
            | ModelEvent::Error { model, .. } => Some(model),
            ModelEvent::Custom(_) => None,
        }
    }

    /// The options of the operation that published the event.
    pub fn options(&self) -> Option<&SetOptions> {
        match self {
            ModelEvent::Change { options, .. }
            | ModelEvent::Changed { options, .. }
            | ModelEvent::Invalid { options, .. }
            | ModelEvent::Destroy { options, .. }
            | ModelEvent::Sync { options, .. }
            | ModelEvent::Error { options, .. } => Some(options),
            ModelEvent::Custom(_) => None,
        }
    }

    /// The new value carried by a `"change:<key>"` event.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ModelEvent::Change { value, .. } => value.as_ref(),
            _ => None,
        }
    }

    /// JSON summary of the payload, without the record handle.
    pub fn summary(&self) -> Value {
        match self {
            ModelEvent::Change { key, value, .. } => serde_json::json!({
                "key": key,
                "value": value,
            }),
            ModelEvent::Changed { model, .. } | ModelEvent::Destroy { model, .. } => {
                serde_json::json!({ "attributes": model.to_json() })
            }
            ModelEvent::Invalid { error, .. } => serde_json::json!({ "error": error }),
            ModelEvent::Sync { response, .. } => serde_json::json!({ "response": response }),
            ModelEvent::Error { error, .. } => serde_json::json!({ "error": error }),
            ModelEvent::Custom(value) => value.clone(),
        }
    }
}

impl From<Value> for ModelEvent {
    fn from(value: Value) -> Self {
        ModelEvent::Custom(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_change_event_name() {
        assert_eq!(change_event("title"), "change:title");
    }

    #[test]
    fn test_custom_event_has_no_model() {
        let event = ModelEvent::from(json!({"n": 1}));
        assert!(event.model().is_none());
        assert!(event.options().is_none());
        assert_eq!(event.summary(), json!({"n": 1}));
    }

    #[test]
    fn test_change_summary() {
        let model = Model::new(json!({"a": 1}));
        let event = ModelEvent::Change {
            model: model.clone(),
            key: "a".into(),
            value: Some(json!(1)),
            options: SetOptions::default(),
        };
        assert_eq!(event.value(), Some(&json!(1)));
        assert_eq!(event.summary(), json!({"key": "a", "value": 1}));
        assert_eq!(event.model().map(Model::cid), Some(model.cid()));
    }
}
