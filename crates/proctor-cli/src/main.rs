//! proctor - proctored assessment session tooling
//!
//! Validates proctor configuration files and runs scripted session drills
//! against a simulated host.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;

/// proctor - proctored assessment session tooling
#[derive(Parser, Debug)]
#[command(name = "proctor")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a configuration file and summarize its assessment
    Validate(commands::validate::ValidateArgs),

    /// Run a scripted session against a simulated host
    Drill(commands::drill::DrillArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let exit_code = match cli.command {
        Commands::Validate(args) => commands::validate::run_validate(&args),
        Commands::Drill(args) => commands::drill::run_drill(&args)?,
    };
    std::process::exit(i32::from(exit_code));
}
