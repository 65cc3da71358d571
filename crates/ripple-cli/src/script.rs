//! Mutation scripts: a record kind, an initial record, reactions and steps.
//!
//! Scripts are TOML or JSON, chosen by file extension:
//!
//! ```toml
//! initial = { title = "draft" }
//!
//! [kind]
//! defaults = { done = false }
//! required = ["title"]
//! types = { done = "bool" }
//!
//! [[reactions]]
//! on = "change:done"
//! set = { archived = true }
//!
//! [[steps]]
//! action = "set"
//! attrs = { done = true }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ripple::prelude::*;

/// Definition of the record kind a script runs against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KindSpec {
    /// Identity attribute, `"id"` when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_attribute: Option<String>,
    /// Default attributes.
    pub defaults: Attributes,
    /// Attributes that must be present and non-null.
    pub required: Vec<String>,
    /// Expected attribute kinds.
    pub types: BTreeMap<String, ValueKind>,
    /// Validate every step, whatever its own options say.
    pub validate: bool,
}

impl KindSpec {
    /// Build the record kind.
    pub fn build(&self) -> Result<ModelKind> {
        let mut builder = Ripple::builder()
            .with_defaults(self.defaults.clone())
            .with_required(self.required.iter().cloned());
        if let Some(id_attribute) = &self.id_attribute {
            builder = builder.with_id_attribute(id_attribute.as_str());
        }
        for (key, kind) in &self.types {
            builder = builder.with_type(key.as_str(), *kind);
        }
        builder.build().context("Failed to build record kind")
    }
}

/// A listener that mutates the record when an event fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    /// Whitespace-separated event names.
    pub on: String,
    /// Attributes to set.
    pub set: Attributes,
    /// React to the first occurrence only.
    #[serde(default)]
    pub once: bool,
}

/// One scripted operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Step {
    /// Set attributes.
    Set {
        attrs: Attributes,
        #[serde(default)]
        options: SetOptions,
    },
    /// Remove one attribute.
    Unset {
        key: String,
        #[serde(default)]
        options: SetOptions,
    },
    /// Remove every attribute.
    Clear {
        #[serde(default)]
        options: SetOptions,
    },
    /// Fire a custom event.
    Trigger {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

impl Step {
    /// One-line description.
    pub fn describe(&self) -> String {
        match self {
            Step::Set { attrs, .. } => format!("set {}", Value::Object(attrs.clone())),
            Step::Unset { key, .. } => format!("unset {}", key),
            Step::Clear { .. } => "clear".to_string(),
            Step::Trigger { event, .. } => format!("trigger {}", event),
        }
    }

    /// Apply the step to `model`. `validate` forces validation on.
    pub fn apply(&self, model: &Model, validate: bool) -> Result<(), ModelError> {
        let force = |options: &SetOptions| {
            let validate = options.validate || validate;
            options.clone().with_validate(validate)
        };
        match self {
            Step::Set { attrs, options } => {
                model.set_all(attrs.clone(), force(options))?;
            }
            Step::Unset { key, options } => {
                model.unset(key.as_str(), force(options))?;
            }
            Step::Clear { options } => {
                model.clear(force(options))?;
            }
            Step::Trigger { event, payload } => {
                model.trigger(event, &ModelEvent::Custom(payload.clone()));
            }
        }
        Ok(())
    }
}

/// A complete script.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Record kind.
    pub kind: KindSpec,
    /// Attributes of the record before the first step.
    pub initial: Attributes,
    /// Listeners installed before the first step.
    pub reactions: Vec<Reaction>,
    /// Operations, in order.
    pub steps: Vec<Step>,
}

impl Script {
    /// Load a script, replacing its kind with the one in `config` if given.
    pub fn load(path: &Path, config: Option<&Path>) -> Result<Self> {
        let mut script: Script = read(path)?;
        if let Some(config) = config {
            script.kind = read(config)?;
        }
        Ok(script)
    }

    /// Install the reactions on `model`.
    pub fn install_reactions(&self, model: &Model) {
        for reaction in &self.reactions {
            let weak = model.downgrade();
            let attrs = reaction.set.clone();
            let callback = Callback::new(move |event: &Event<'_, ModelEvent>| {
                let Some(model) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = model.set_all(attrs.clone(), SetOptions::default()) {
                    tracing::warn!(event = event.name, error = %e, "Reaction failed");
                }
            });
            if reaction.once {
                model.once(&reaction.on, &callback);
            } else {
                model.on(&reaction.on, &callback);
            }
        }
    }
}

/// Parse a TOML or JSON file.
pub fn read<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    match extension {
        "toml" => toml::from_str(&text)
            .with_context(|| format!("Failed to parse TOML in {}", path.display())),
        "json" => serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse JSON in {}", path.display())),
        other => bail!(
            "Unsupported script format '{}' for {} (expected .toml or .json)",
            other,
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML_SCRIPT: &str = r#"
initial = { title = "draft" }

[kind]
defaults = { done = false }
required = ["title"]
types = { done = "bool" }

[[reactions]]
on = "change:done"
set = { archived = true }
once = true

[[steps]]
action = "set"
attrs = { done = true }

[[steps]]
action = "unset"
key = "title"
options = { validate = true }

[[steps]]
action = "trigger"
event = "ping"
"#;

    #[test]
    fn test_parse_toml_script() {
        let script: Script = toml::from_str(TOML_SCRIPT).unwrap();
        assert_eq!(script.kind.required, vec!["title"]);
        assert_eq!(script.kind.types.get("done"), Some(&ValueKind::Bool));
        assert_eq!(script.reactions.len(), 1);
        assert!(script.reactions[0].once);
        assert_eq!(script.steps.len(), 3);
        assert_eq!(script.steps[1].describe(), "unset title");
    }

    #[test]
    fn test_parse_json_script() {
        let script: Script = serde_json::from_value(json!({
            "initial": {"name": "x"},
            "steps": [{"action": "set", "attrs": {"name": "y"}}, {"action": "clear"}]
        }))
        .unwrap();
        assert!(script.kind.required.is_empty());
        assert!(matches!(script.steps[1], Step::Clear { .. }));
    }

    #[test]
    fn test_steps_and_reactions() {
        let script: Script = toml::from_str(TOML_SCRIPT).unwrap();
        let kind = script.kind.build().unwrap();
        let model = kind.create(script.initial.clone());
        script.install_reactions(&model);

        script.steps[0].apply(&model, false).unwrap();
        assert_eq!(model.get("archived"), Some(json!(true)));

        let err = script.steps[1].apply(&model, false).unwrap_err();
        assert!(matches!(err, ModelError::Invalid(_)));
        assert_eq!(model.get("title"), Some(json!("draft")));

        script.steps[2].apply(&model, false).unwrap();
    }

    #[test]
    fn test_kind_spec_id_attribute() {
        let spec = KindSpec {
            id_attribute: Some("_id".to_string()),
            ..KindSpec::default()
        };
        assert_eq!(spec.build().unwrap().config().id_attribute, "_id");
    }

    #[test]
    fn test_unsupported_extension() {
        let path = std::env::temp_dir().join(format!("ripple-script-{}.yaml", std::process::id()));
        fs::write(&path, "steps: []").unwrap();
        let err = read::<Script>(&path).unwrap_err();
        fs::remove_file(&path).unwrap();
        assert!(err.to_string().contains("Unsupported script format 'yaml'"));
    }

    #[test]
    fn test_missing_file() {
        let err = read::<Script>(Path::new("does/not/exist.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
