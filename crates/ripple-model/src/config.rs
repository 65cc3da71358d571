//! Per-kind record configuration.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::options::Attributes;
use crate::sync::SyncBackend;
use crate::validator::Validator;

/// Default name of the identity attribute.
pub const DEFAULT_ID_ATTRIBUTE: &str = "id";

/// Configuration shared by every record of one kind.
///
/// Records keep an `Rc` to their kind's configuration, so building one
/// configuration and creating many records from it is cheap.
#[derive(Clone)]
pub struct ModelConfig {
    /// Attribute whose value is the record's server id.
    pub id_attribute: String,

    /// Attributes every new record starts with. Values passed at
    /// construction win over these.
    pub defaults: Attributes,

    /// Validator run for validated mutations.
    pub validator: Option<Rc<dyn Validator>>,

    /// Persistence backend.
    pub backend: Option<Rc<dyn SyncBackend>>,
}

impl ModelConfig {
    /// Create a configuration with no defaults, no validator and no backend.
    pub fn new() -> Self {
        Self {
            id_attribute: DEFAULT_ID_ATTRIBUTE.to_string(),
            defaults: Attributes::new(),
            validator: None,
            backend: None,
        }
    }

    /// Set the identity attribute.
    pub fn with_id_attribute(mut self, name: impl Into<String>) -> Self {
        self.id_attribute = name.into();
        self
    }

    /// Add one default attribute.
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Replace the default attributes.
    pub fn with_defaults(mut self, defaults: Attributes) -> Self {
        self.defaults = defaults;
        self
    }

    /// Set the validator.
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    /// Set the persistence backend.
    pub fn with_backend<B: SyncBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Rc::new(backend));
        self
    }

    /// Set a backend that is shared with other kinds.
    pub fn with_shared_backend(mut self, backend: Rc<dyn SyncBackend>) -> Self {
        self.backend = Some(backend);
        self
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("id_attribute", &self.id_attribute)
            .field("defaults", &self.defaults)
            .field("validator", &self.validator.is_some())
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::MemoryBackend;
    use crate::validator::RequiredKeys;
    use serde_json::json;

    #[test]
    fn test_config_defaults() {
        let config = ModelConfig::default();
        assert_eq!(config.id_attribute, "id");
        assert!(config.defaults.is_empty());
        assert!(config.validator.is_none());
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = ModelConfig::new()
            .with_id_attribute("_id")
            .with_default("title", "untitled")
            .with_validator(RequiredKeys::new(["title"]))
            .with_backend(MemoryBackend::new());

        assert_eq!(config.id_attribute, "_id");
        assert_eq!(config.defaults.get("title"), Some(&json!("untitled")));
        assert!(config.validator.is_some());
        assert!(config.backend.is_some());
        assert!(format!("{:?}", config).contains("_id"));
    }
}
