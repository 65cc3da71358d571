//! Validators attached to a record kind.
//!
//! A validator inspects the *candidate* state of a record (current attributes
//! overlaid with the incoming change) and either accepts it or describes why
//! it is rejected. Validators never mutate anything.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::options::{Attributes, SetOptions};

/// Decides whether a candidate attribute state is acceptable.
///
/// Closures of the right shape are validators:
///
/// ```
/// use ripple_model::{Attributes, SetOptions, ValidationError, Validator};
///
/// let positive = |attrs: &Attributes, _: &SetOptions| {
///     match attrs.get("count").and_then(|v| v.as_i64()) {
///         Some(n) if n < 0 => Some(ValidationError::for_key("count", "must be positive")),
///         _ => None,
///     }
/// };
///
/// let mut attrs = Attributes::new();
/// attrs.insert("count".into(), (-1).into());
/// assert!(positive.validate(&attrs, &SetOptions::default()).is_some());
/// ```
pub trait Validator {
    /// Return a failure description, or `None` to accept the candidate.
    fn validate(&self, candidate: &Attributes, options: &SetOptions) -> Option<ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Attributes, &SetOptions) -> Option<ValidationError>,
{
    fn validate(&self, candidate: &Attributes, options: &SetOptions) -> Option<ValidationError> {
        self(candidate, options)
    }
}

/// Shared validator handle.
pub type SharedValidator = Rc<dyn Validator>;

/// Requires attributes to be present and non-null.
#[derive(Debug, Clone, Default)]
pub struct RequiredKeys {
    keys: Vec<String>,
}

impl RequiredKeys {
    /// Require every key in `keys`.
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// The required keys.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Validator for RequiredKeys {
    fn validate(&self, candidate: &Attributes, _options: &SetOptions) -> Option<ValidationError> {
        self.keys
            .iter()
            .find(|key| candidate.get(key.as_str()).is_none_or(Value::is_null))
            .map(|key| ValidationError::for_key(key.as_str(), "is required"))
    }
}

/// JSON value kinds an attribute can be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// JSON string.
    String,
    /// JSON number.
    Number,
    /// Whole JSON number.
    Integer,
    /// JSON boolean.
    Bool,
    /// JSON array.
    Array,
    /// JSON object.
    Object,
}

impl ValueKind {
    /// Check whether `value` is of this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ValueKind::String => value.is_string(),
            ValueKind::Number => value.is_number(),
            ValueKind::Integer => value.is_i64() || value.is_u64(),
            ValueKind::Bool => value.is_boolean(),
            ValueKind::Array => value.is_array(),
            ValueKind::Object => value.is_object(),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Integer => "integer",
            ValueKind::Bool => "bool",
            ValueKind::Array => "array",
            ValueKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Constrains attribute kinds. Absent and null attributes are accepted.
#[derive(Debug, Clone, Default)]
pub struct TypeRules {
    rules: BTreeMap<String, ValueKind>,
}

impl TypeRules {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain `key` to `kind`.
    pub fn with(mut self, key: impl Into<String>, kind: ValueKind) -> Self {
        self.rules.insert(key.into(), kind);
        self
    }

    /// Check if there are no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<(String, ValueKind)> for TypeRules {
    fn from_iter<I: IntoIterator<Item = (String, ValueKind)>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

impl Validator for TypeRules {
    fn validate(&self, candidate: &Attributes, _options: &SetOptions) -> Option<ValidationError> {
        self.rules.iter().find_map(|(key, kind)| match candidate.get(key) {
            Some(value) if !value.is_null() && !kind.matches(value) => Some(
                ValidationError::for_key(key.as_str(), format!("must be a {}", kind)),
            ),
            _ => None,
        })
    }
}

/// Runs validators in order; the first failure wins.
#[derive(Clone, Default)]
pub struct ValidatorChain {
    validators: Vec<SharedValidator>,
}

impl ValidatorChain {
    /// Create an empty chain, which accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a validator.
    pub fn with<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Rc::new(validator));
        self
    }

    /// Append a shared validator.
    pub fn with_shared(mut self, validator: SharedValidator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Number of validators in the chain.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl Validator for ValidatorChain {
    fn validate(&self, candidate: &Attributes, options: &SetOptions) -> Option<ValidationError> {
        self.validators
            .iter()
            .find_map(|validator| validator.validate(candidate, options))
    }
}

impl fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorChain")
            .field("len", &self.validators.len())
            .finish()
    }
}
