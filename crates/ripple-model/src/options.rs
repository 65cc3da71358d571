//! Mutation options and argument normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// Attribute map. Iteration follows insertion order.
pub type Attributes = serde_json::Map<String, Value>;

/// Options for a mutation.
///
/// Listeners receive the options of the mutation that notified them, so
/// arbitrary caller data can travel in [`meta`](Self::meta).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetOptions {
    /// Apply the change without emitting any event.
    pub silent: bool,

    /// Remove the given keys instead of assigning them.
    pub unset: bool,

    /// Run the kind's validator before applying anything.
    pub validate: bool,

    /// When saving, send the attributes first and apply them only once the
    /// backend accepts them.
    pub wait: bool,

    /// When saving a persisted record, send only the given attributes.
    pub patch: bool,

    /// Attributes sent with a patch request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Attributes>,

    /// The failure that rejected this mutation, filled in for `"invalid"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_error: Option<ValidationError>,

    /// Free-form caller data.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: Attributes,
}

impl SetOptions {
    /// Create default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit no events.
    pub fn silent() -> Self {
        Self::new().with_silent(true)
    }

    /// Validate before applying.
    pub fn validated() -> Self {
        Self::new().with_validate(true)
    }

    /// Set whether events are suppressed.
    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Set whether keys are removed instead of assigned.
    pub fn with_unset(mut self, unset: bool) -> Self {
        self.unset = unset;
        self
    }

    /// Set whether the validator runs.
    pub fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set whether saving waits for the backend.
    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait = wait;
        self
    }

    /// Set whether saving sends a patch.
    pub fn with_patch(mut self, patch: bool) -> Self {
        self.patch = patch;
        self
    }

    /// Attach caller data.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// The attributes a mutation applies, normalized from the accepted argument
/// shapes.
///
/// A `(key, value)` pair, an attribute map, and a JSON object all become a
/// map. `None`, JSON `null`, and any other non-object JSON value become an
/// empty patch, which makes the mutation a no-op.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch(Option<Attributes>);

impl Patch {
    /// A patch that changes nothing.
    pub fn none() -> Self {
        Self(None)
    }

    /// Consume the patch.
    pub fn into_attributes(self) -> Option<Attributes> {
        self.0
    }

    /// Check whether the patch is a no-op.
    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl From<Attributes> for Patch {
    fn from(attrs: Attributes) -> Self {
        Self(Some(attrs))
    }
}

impl From<Option<Attributes>> for Patch {
    fn from(attrs: Option<Attributes>) -> Self {
        Self(attrs)
    }
}

impl From<Value> for Patch {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(attrs) => Self(Some(attrs)),
            _ => Self(None),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> From<(K, V)> for Patch {
    fn from((key, value): (K, V)) -> Self {
        let mut attrs = Attributes::new();
        attrs.insert(key.into(), value.into());
        Self(Some(attrs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_shapes() {
        let pair = Patch::from(("name", "x")).into_attributes().unwrap();
        assert_eq!(pair.get("name"), Some(&json!("x")));

        let object = Patch::from(json!({"a": 1, "b": 2})).into_attributes().unwrap();
        assert_eq!(object.keys().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(Patch::from(Value::Null).is_none());
        assert!(Patch::from(json!(42)).is_none());
        assert!(Patch::from(None::<Attributes>).is_none());
    }

    #[test]
    fn test_options_builder() {
        let options = SetOptions::validated()
            .with_silent(true)
            .with_meta("source", "test");
        assert!(options.validate);
        assert!(options.silent);
        assert!(!options.unset);
        assert_eq!(options.meta.get("source"), Some(&json!("test")));
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: SetOptions = serde_json::from_value(json!({"silent": true})).unwrap();
        assert!(options.silent);
        assert!(!options.validate);
        assert!(options.meta.is_empty());
    }
}
