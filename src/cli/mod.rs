//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `run`: Discover namespaces and reconcile them with the catalogue
//! - `init`: Create an example configuration file
//! - `validate`: Validate a configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Full run against the configured repository and catalogue
//! nsdiscovery run
//!
//! # Use an existing working copy, four workers, no sweep
//! nsdiscovery run --local --checkout-dir ./cloud-platform-environments -w 4 --skip-sweep
//!
//! # JSON logs for log shipping
//! nsdiscovery --log-format json run
//!
//! # Initialize configuration
//! nsdiscovery init
//!
//! # Validate configuration
//! nsdiscovery validate nsdiscovery.yaml
//! ```

use crate::config::Config;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// NsDiscovery - Terraform namespace discovery for the service catalogue.
#[derive(Parser, Debug)]
#[command(
    name = "nsdiscovery",
    author,
    version,
    about = "Discover Terraform-declared namespace resources and reconcile them with the service catalogue",
    long_about = "NsDiscovery walks the namespace directories of an environments repository, \
                  extracts databases, caches, template bindings and uptime checks from their \
                  Terraform, and keeps one catalogue record per namespace in sync."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, env = "NSDISCOVERY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Discover namespaces and reconcile them with the catalogue
    #[command(visible_alias = "r")]
    Run(RunArgs),

    /// Create an example configuration file
    Init(InitArgs),

    /// Validate a configuration file
    Validate(ValidateArgs),
}

/// Arguments for the run command.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Maximum number of components processed at once
    #[arg(short = 'w', long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Working copy of the environments repository
    #[arg(short = 'd', long, value_name = "DIR")]
    pub checkout_dir: Option<PathBuf>,

    /// Cluster domain directory under namespaces/
    #[arg(long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    /// Fail a component after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub unit_timeout: Option<u64>,

    /// Do not delete catalogue namespaces missing from the checkout
    #[arg(long)]
    pub skip_sweep: bool,

    /// Do not refresh an existing working copy
    #[arg(long)]
    pub no_pull: bool,

    /// Use the checkout directory as is, without any git operation
    #[arg(long, conflicts_with = "no_pull")]
    pub local: bool,
}

impl RunArgs {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(workers) = self.max_workers {
            config.discovery.max_workers = workers;
        }
        if let Some(dir) = &self.checkout_dir {
            config.discovery.checkout_dir.clone_from(dir);
        }
        if let Some(domain) = &self.domain {
            config.discovery.namespace_domain.clone_from(domain);
        }
        if self.unit_timeout.is_some() {
            config.discovery.unit_timeout_secs = self.unit_timeout;
        }
        if self.skip_sweep {
            config.discovery.sweep = false;
        }
        if self.no_pull {
            config.git.pull = false;
        }
    }
}

/// Arguments for the init command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the example configuration
    #[arg(default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for the validate command.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Configuration file to validate
    #[arg(value_name = "CONFIG", default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub file: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_parsing() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::parse_from(["nsdiscovery", "run"]);
        assert_eq!(cli.log_format, LogFormat::Text);
        match cli.command {
            Commands::Run(args) => {
                assert!(args.max_workers.is_none());
                assert!(!args.skip_sweep);
                assert!(!args.local);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_options() {
        let cli = Cli::parse_from([
            "nsdiscovery",
            "--log-format",
            "json",
            "run",
            "-w",
            "4",
            "--checkout-dir",
            "/srv/envs",
            "--unit-timeout",
            "120",
            "--skip-sweep",
            "--local",
        ]);
        assert_eq!(cli.log_format, LogFormat::Json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.max_workers, Some(4));
                assert_eq!(args.checkout_dir, Some(PathBuf::from("/srv/envs")));
                assert_eq!(args.unit_timeout, Some(120));
                assert!(args.skip_sweep);
                assert!(args.local);
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_alias() {
        let cli = Cli::parse_from(["nsdiscovery", "r", "--no-pull"]);
        assert!(matches!(cli.command, Commands::Run(RunArgs { no_pull: true, .. })));
    }

    #[test]
    fn test_local_conflicts_with_no_pull() {
        let result = Cli::try_parse_from(["nsdiscovery", "run", "--local", "--no-pull"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_run_args_override_config() {
        let mut config = Config::default();
        let args = RunArgs {
            max_workers: Some(2),
            checkout_dir: Some(PathBuf::from("/srv/envs")),
            domain: Some("test.example".to_string()),
            unit_timeout: Some(30),
            skip_sweep: true,
            no_pull: true,
            local: false,
        };
        args.apply(&mut config);

        assert_eq!(config.discovery.max_workers, 2);
        assert_eq!(config.discovery.checkout_dir, PathBuf::from("/srv/envs"));
        assert_eq!(config.discovery.namespace_domain, "test.example");
        assert_eq!(config.discovery.unit_timeout_secs, Some(30));
        assert!(!config.discovery.sweep);
        assert!(!config.git.pull);
    }

    #[test]
    fn test_empty_run_args_keep_config() {
        let mut config = Config::default();
        config.discovery.unit_timeout_secs = Some(60);
        RunArgs::default().apply(&mut config);
        assert_eq!(config.discovery.max_workers, 10);
        assert_eq!(config.discovery.unit_timeout_secs, Some(60));
        assert!(config.discovery.sweep);
    }

    #[test]
    fn test_validate_default_path() {
        let cli = Cli::parse_from(["nsdiscovery", "validate"]);
        match cli.command {
            Commands::Validate(args) => assert_eq!(args.file, PathBuf::from("nsdiscovery.yaml")),
            _ => panic!("Expected Validate command"),
        }
    }
}
