//! Inspect command - Show the record kind and initial record of a script.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use ripple::prelude::*;

use crate::OutputFormat;
use crate::script::{Reaction, Script};

/// Arguments for the inspect command.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the script (.toml or .json)
    #[arg(required = true)]
    pub script: PathBuf,

    /// List the steps
    #[arg(long)]
    pub steps: bool,

    /// List the reactions
    #[arg(long)]
    pub reactions: bool,

    /// Show all information
    #[arg(long, short)]
    pub all: bool,
}

/// Inspection result.
#[derive(Debug, Serialize)]
struct InspectionResult {
    path: String,
    kind: KindDisplay,
    record: RecordDisplay,
    #[serde(skip_serializing_if = "Option::is_none")]
    reactions: Option<Vec<Reaction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    steps: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct KindDisplay {
    id_attribute: String,
    defaults: Attributes,
    required: Vec<String>,
    types: BTreeMap<String, String>,
    validated: bool,
}

#[derive(Debug, Serialize)]
struct RecordDisplay {
    cid: String,
    is_new: bool,
    attributes: Attributes,
}

/// Execute the inspect command.
pub fn execute(args: InspectArgs, config: Option<&Path>, format: OutputFormat) -> Result<()> {
    let script = Script::load(&args.script, config)?;
    let kind = script.kind.build()?;
    let model = kind.create(script.initial.clone());

    let show_steps = args.steps || args.all;
    let show_reactions = args.reactions || args.all;

    let result = InspectionResult {
        path: args.script.display().to_string(),
        kind: KindDisplay {
            id_attribute: kind.config().id_attribute.clone(),
            defaults: kind.config().defaults.clone(),
            required: script.kind.required.clone(),
            types: script
                .kind
                .types
                .iter()
                .map(|(key, kind)| (key.clone(), kind.to_string()))
                .collect(),
            validated: script.kind.validate,
        },
        record: RecordDisplay {
            cid: model.cid().to_string(),
            is_new: model.is_new(),
            attributes: model.to_json(),
        },
        reactions: show_reactions.then(|| script.reactions.clone()),
        steps: show_steps.then(|| script.steps.iter().map(|s| s.describe()).collect()),
    };

    match format {
        OutputFormat::Human => print_human(&result),
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", format.to_json(&result)?);
        }
    }

    Ok(())
}

fn print_human(result: &InspectionResult) {
    println!("Script: {}", result.path);
    println!();

    println!("Kind:");
    println!("  Id attribute: {}", result.kind.id_attribute);
    println!("  Validate every step: {}", result.kind.validated);
    if !result.kind.defaults.is_empty() {
        println!("  Defaults:");
        for (key, value) in &result.kind.defaults {
            println!("    {} = {}", key, value);
        }
    }
    if !result.kind.required.is_empty() {
        println!("  Required: {}", result.kind.required.join(", "));
    }
    if !result.kind.types.is_empty() {
        println!("  Types:");
        for (key, kind) in &result.kind.types {
            println!("    {}: {}", key, kind);
        }
    }

    println!();
    println!("Record:");
    println!("  Cid: {}", result.record.cid);
    println!("  New: {}", result.record.is_new);
    println!(
        "  Attributes: {}",
        Value::Object(result.record.attributes.clone())
    );

    if let Some(reactions) = &result.reactions {
        println!();
        println!("Reactions ({}):", reactions.len());
        for reaction in reactions {
            let once = if reaction.once { " (once)" } else { "" };
            println!(
                "  on {}{} -> set {}",
                reaction.on,
                once,
                Value::Object(reaction.set.clone())
            );
        }
    }

    if let Some(steps) = &result.steps {
        println!();
        println!("Steps ({}):", steps.len());
        for (index, step) in steps.iter().enumerate() {
            println!("  {}. {}", index + 1, step);
        }
    }
}
