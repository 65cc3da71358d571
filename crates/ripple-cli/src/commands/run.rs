//! Run command - Replay a script and report every event it caused.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use ripple::prelude::*;

use crate::OutputFormat;
use crate::script::Script;

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the script (.toml or .json)
    #[arg(required = true)]
    pub script: PathBuf,

    /// Maximum number of events to record
    #[arg(long, default_value = "10000")]
    pub max_events: usize,

    /// Stop at the first failing step
    #[arg(long)]
    pub fail_fast: bool,
}

#[derive(Debug, Serialize)]
struct TracedEvent {
    name: String,
    detail: Value,
}

#[derive(Debug, Serialize)]
struct StepReport {
    index: usize,
    step: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    events: Vec<TracedEvent>,
}

/// Run report.
#[derive(Debug, Serialize)]
struct RunReport {
    path: String,
    cid: String,
    steps: Vec<StepReport>,
    attributes: Attributes,
    changed: Option<Attributes>,
    previous: Attributes,
    failed: usize,
}

/// Execute the run command.
pub fn execute(
    args: RunArgs,
    config: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let script = Script::load(&args.script, config)?;
    let kind = script.kind.build()?;

    let initial = SetOptions::new().with_validate(script.kind.validate);
    let model = kind
        .try_create(script.initial.clone(), initial)
        .context("Initial record is invalid")?;
    script.install_reactions(&model);

    let recorder: EventRecorder<Value> = EventRecorder::new(args.max_events);
    recorder.attach_with(model.hub(), |event: &Event<'_, ModelEvent>| {
        event.payload.summary()
    });

    if !quiet {
        tracing::info!(
            script = %args.script.display(),
            steps = script.steps.len(),
            reactions = script.reactions.len(),
            "Running script"
        );
    }

    let mut steps = Vec::with_capacity(script.steps.len());
    for (index, step) in script.steps.iter().enumerate() {
        let seen = recorder.len();
        let result = step.apply(&model, script.kind.validate);

        let events = recorder
            .events()
            .into_iter()
            .skip(seen)
            .map(|event| TracedEvent {
                name: event.name,
                detail: event.detail,
            })
            .collect();
        let error = result.err().map(|e| e.to_string());
        let stop = error.is_some() && args.fail_fast;

        steps.push(StepReport {
            index: index + 1,
            step: step.describe(),
            error,
            events,
        });
        if stop {
            break;
        }
    }

    let failed = steps.iter().filter(|s| s.error.is_some()).count();
    let report = RunReport {
        path: args.script.display().to_string(),
        cid: model.cid().to_string(),
        steps,
        attributes: model.to_json(),
        changed: model.changed_attributes(None),
        previous: model.previous_attributes(),
        failed,
    };

    // Output results
    match format {
        OutputFormat::Human => {
            if !quiet {
                println!("Script: {} (record {})", report.path, report.cid);
                println!();
            }
            for step in &report.steps {
                println!("Step {}: {}", step.index, step.step);
                for event in &step.events {
                    println!("  {:<16} {}", event.name, event.detail);
                }
                if let Some(error) = &step.error {
                    println!("  ! {}", error);
                }
            }
            println!();
            println!("Attributes: {}", Value::Object(report.attributes.clone()));
            match &report.changed {
                Some(changed) => println!("Changed:    {}", Value::Object(changed.clone())),
                None => println!("Changed:    (none)"),
            }
        }
        OutputFormat::Json | OutputFormat::JsonCompact => {
            println!("{}", format.to_json(&report)?);
        }
    }

    if failed == 0 {
        Ok(())
    } else {
        Err(anyhow::anyhow!(
            "{} of {} steps failed",
            failed,
            report.steps.len()
        ))
    }
}
