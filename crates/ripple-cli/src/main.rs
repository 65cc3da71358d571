//! `ripple` - replay mutation scripts against observable records and show
//! the events they cause.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod script;

#[derive(Parser)]
#[command(name = "ripple", author, version, about = "Replay scripts against Ripple records")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Kind definition (.toml or .json) used instead of the script's `kind`
    #[arg(short, long, global = true, value_name = "KIND")]
    pub config: Option<PathBuf>,

    /// How reports are printed
    #[arg(short = 'f', long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Trace record internals (-v info, -vv debug, -vvv every event)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print reports only, no banners or error messages
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Report format.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    #[default]
    Human,
    /// Indented JSON
    Json,
    /// JSON on one line
    JsonCompact,
}

impl OutputFormat {
    /// Serialize a report for one of the JSON formats.
    pub fn to_json<T: serde::Serialize>(self, report: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::JsonCompact => serde_json::to_string(report),
            _ => serde_json::to_string_pretty(report),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply every step and print the events each one fired
    Run(commands::run::RunArgs),
    /// Apply every step with validation forced on and list the failures
    Validate(commands::validate::ValidateArgs),
    /// Show the resolved kind and the initial record
    Inspect(commands::inspect::InspectArgs),
}

/// Route `ripple*` targets to stderr. `RUST_LOG` takes precedence over `-v`.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ripple={level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let kind = cli.config.as_deref();
    let outcome = match cli.command {
        Commands::Run(args) => commands::run::execute(args, kind, cli.format, cli.quiet),
        Commands::Validate(args) => commands::validate::execute(args, kind, cli.format),
        Commands::Inspect(args) => commands::inspect::execute(args, kind, cli.format),
    };

    if let Err(e) = outcome {
        if !cli.quiet {
            eprintln!("Error: {:#}", e);
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
