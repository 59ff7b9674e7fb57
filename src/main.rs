//! NsDiscovery CLI entry point.
//!
//! This binary provides the command-line interface for NsDiscovery.

use clap::Parser;
use nsdiscovery::cli::{Cli, Commands, InitArgs, LogFormat, RunArgs, ValidateArgs};
use nsdiscovery::{Config, Discovery, DiscoveryError, JobStatus, NamespaceOutcome, RunSummary};
use std::error::Error;
use std::process::ExitCode;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code of a run that finished with per-unit failures.
const EXIT_COMPLETED_WITH_ERRORS: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Configuration is loaded before logging so its log level can apply
    let config = Config::load(cli.config.as_deref());
    let config_level = config.as_ref().ok().and_then(|c| c.log_level.clone());
    init_logging(cli.verbose, cli.quiet, cli.log_format, config_level.as_deref());

    match run(cli, config).await {
        Ok(exit_code) => exit_code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");

            // Print error with full chain
            eprintln!("Error: {e}");
            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<DiscoveryError>()
                .map_or(1, DiscoveryError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool, format: LogFormat, config_level: Option<&str>) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // RUST_LOG wins, then -v, then the configured level
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match (verbose, config_level) {
                (0, Some(level)) => level,
                (0, None) => "info",
                (1, _) => "debug",
                _ => "trace",
            };
            EnvFilter::new(format!("warn,nsdiscovery={base_level}"))
        })
    };

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(false).with_writer(std::io::stderr))
            .init(),
    }
}

async fn run(cli: Cli, config: nsdiscovery::Result<Config>) -> anyhow::Result<ExitCode> {
    match cli.command {
        Commands::Run(args) => run_discovery(config?, &args).await,
        Commands::Init(args) => init(&args),
        Commands::Validate(args) => validate(&args),
    }
}

async fn run_discovery(mut config: Config, args: &RunArgs) -> anyhow::Result<ExitCode> {
    args.apply(&mut config);
    tracing::debug!(?args, "Executing run command");

    let discovery = Discovery::from_config(config, args.local)?;
    let summary = discovery.run().await?;
    print_summary(&summary);

    Ok(match summary.status {
        JobStatus::Succeeded => ExitCode::SUCCESS,
        JobStatus::CompletedWithErrors | JobStatus::Failed => ExitCode::from(EXIT_COMPLETED_WITH_ERRORS),
    })
}

fn print_summary(summary: &RunSummary) {
    let batch = &summary.batch;
    println!("Status: {}", summary.status);
    println!(
        "Components: {} ({} failed)",
        batch.components.len(),
        batch.failed()
    );
    println!(
        "Namespaces: {} created, {} updated, {} skipped",
        batch.count(NamespaceOutcome::Created),
        batch.count(NamespaceOutcome::Updated),
        batch.count(NamespaceOutcome::Skipped)
    );
    match &summary.sweep {
        Some(sweep) if sweep.skipped => println!("Sweep: skipped"),
        Some(sweep) => println!("Sweep: {} deleted, {} failed", sweep.deleted.len(), sweep.failed.len()),
        None => println!("Sweep: disabled"),
    }
    if !summary.errors.is_empty() {
        println!("Errors:");
        for error in &summary.errors {
            println!("  - {error}");
        }
    }
}

fn init(args: &InitArgs) -> anyhow::Result<ExitCode> {
    if args.output.exists() && !args.force {
        anyhow::bail!("Configuration file already exists: {}", args.output.display());
    }

    std::fs::write(&args.output, Config::example_yaml())?;
    println!("Created example configuration: {}", args.output.display());
    Ok(ExitCode::SUCCESS)
}

fn validate(args: &ValidateArgs) -> anyhow::Result<ExitCode> {
    let content = std::fs::read_to_string(&args.file)?;
    match Config::from_yaml(&content).and_then(|config| config.validate()) {
        Ok(()) => {
            println!("Configuration is valid: {}", args.file.display());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Configuration error: {e}");
            Ok(ExitCode::from(1))
        }
    }
}
