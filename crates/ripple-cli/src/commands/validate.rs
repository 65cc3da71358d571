//! Validate command - Check a script and report the steps that would fail.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use ripple::prelude::*;

use crate::OutputFormat;
use crate::script::{Script, Step};

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the script (.toml or .json)
    #[arg(required = true)]
    pub script: PathBuf,

    /// Strict validation mode
    #[arg(long)]
    pub strict: bool,
}

/// Validation result.
#[derive(Debug, Serialize)]
struct ValidationResult {
    valid: bool,
    path: String,
    steps: usize,
    reactions: usize,
    warnings: Vec<String>,
    errors: Vec<String>,
}

/// Execute the validate command.
pub fn execute(args: ValidateArgs, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut result = ValidationResult {
        valid: true,
        path: args.script.display().to_string(),
        steps: 0,
        reactions: 0,
        warnings: Vec::new(),
        errors: Vec::new(),
    };

    match Script::load(&args.script, config) {
        Ok(script) => check(&script, args.strict, &mut result),
        Err(e) => result.errors.push(format!("{:#}", e)),
    }
    result.valid = result.errors.is_empty();

    // Output results
    match format {
        OutputFormat::Human => {
            if result.valid {
                println!("Script is valid: {}", args.script.display());
                println!("  Steps: {}", result.steps);
                println!("  Reactions: {}", result.reactions);
            } else {
                println!("Script is INVALID: {}", args.script.display());
                for error in &result.errors {
                    println!("  Error: {}", error);
                }
            }

            if !result.warnings.is_empty() {
                println!("\nWarnings:");
                for warning in &result.warnings {
                    println!("  - {}", warning);
                }
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", format.to_json(&result)?);
        }
    }

    if result.valid {
        Ok(())
    } else {
        Err(anyhow::anyhow!("Validation failed"))
    }
}

/// Replay `script` with every step validated and no listeners but its own
/// reactions, collecting failures.
fn check(script: &Script, strict: bool, result: &mut ValidationResult) {
    result.steps = script.steps.len();
    result.reactions = script.reactions.len();

    let kind = match script.kind.build() {
        Ok(kind) => kind,
        Err(e) => {
            result.errors.push(format!("{:#}", e));
            return;
        }
    };

    if kind.config().validator.is_none() {
        result
            .warnings
            .push("Record kind has no validation rules - every step is accepted".to_string());
    }

    for (index, reaction) in script.reactions.iter().enumerate() {
        if reaction.on.trim().is_empty() {
            result
                .warnings
                .push(format!("Reaction {} listens to no event", index + 1));
        }
    }

    let model = match kind.try_create(script.initial.clone(), SetOptions::validated()) {
        Ok(model) => model,
        Err(e) => {
            result.errors.push(format!("Initial record: {}", e));
            return;
        }
    };
    script.install_reactions(&model);

    for (index, step) in script.steps.iter().enumerate() {
        if let Step::Set { attrs, .. } = step {
            if attrs.is_empty() {
                result
                    .warnings
                    .push(format!("Step {} sets no attributes", index + 1));
            }
        }

        if let Step::Trigger { event, .. } = step {
            let heard = script
                .reactions
                .iter()
                .any(|r| r.on.split_whitespace().any(|name| name == event || name == ALL));
            if strict && !heard {
                result.warnings.push(format!(
                    "Step {} triggers '{}', which no reaction listens to",
                    index + 1,
                    event
                ));
            }
        }

        if let Err(e) = step.apply(&model, true) {
            result
                .errors
                .push(format!("Step {} ({}): {}", index + 1, step.describe(), e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_result() -> ValidationResult {
        ValidationResult {
            valid: true,
            path: String::new(),
            steps: 0,
            reactions: 0,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_check_reports_failing_steps() {
        let script: Script = serde_json::from_value(json!({
            "kind": {"required": ["name"], "types": {"age": "integer"}},
            "initial": {"name": "x"},
            "steps": [
                {"action": "set", "attrs": {"age": 3}},
                {"action": "set", "attrs": {"age": "three"}},
                {"action": "unset", "key": "name"}
            ]
        }))
        .unwrap();

        let mut result = empty_result();
        check(&script, false, &mut result);

        assert_eq!(result.steps, 3);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].starts_with("Step 2"));
        assert!(result.errors[1].contains("name: is required"));
    }

    #[test]
    fn test_check_warns_in_strict_mode() {
        let script: Script = serde_json::from_value(json!({
            "steps": [{"action": "trigger", "event": "ping"}, {"action": "set", "attrs": {}}]
        }))
        .unwrap();

        let mut result = empty_result();
        check(&script, true, &mut result);

        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 3);
    }

    #[test]
    fn test_invalid_initial_record() {
        let script: Script = serde_json::from_value(json!({
            "kind": {"required": ["name"]},
            "steps": [{"action": "clear"}]
        }))
        .unwrap();

        let mut result = empty_result();
        check(&script, false, &mut result);

        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Initial record"));
    }
}
