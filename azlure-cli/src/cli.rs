//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// AzLure -- decoy-credential deception log pipeline.
///
/// Use `azlure <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "azlure", version, about, long_about = None)]
pub struct Cli {
    /// Path to the azlure.toml configuration file.
    #[arg(short, long, default_value = "azlure.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table / text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one ingestion pass per enabled category.
    Run(RunArgs),

    /// Show store totals and per-category watermarks.
    Status(StatusArgs),

    /// Query recorded detection events.
    Events(EventsArgs),

    /// Count events per rule over a time window.
    Summary(SummaryArgs),

    /// Show the effective detection rule set.
    Rules(RulesArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

/// Run a one-shot ingestion pass.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Restrict the pass to a single category
    /// (storage_read, storage_write, key_vault_audit, activity_log).
    #[arg(long)]
    pub category: Option<String>,
}

// ---- status ----

/// Display store totals and watermarks.
#[derive(Args, Debug)]
pub struct StatusArgs {}

// ---- events ----

/// Query recorded detection events, ordered by event time ascending.
#[derive(Args, Debug)]
pub struct EventsArgs {
    /// Lower bound on event time (RFC 3339, or relative like "24h", "7d").
    #[arg(long)]
    pub since: Option<String>,

    /// Upper bound on event time (RFC 3339, or relative like "1h").
    #[arg(long)]
    pub until: Option<String>,

    /// Filter by rule id.
    #[arg(long)]
    pub rule: Option<String>,

    /// Minimum severity (info, low, medium, high, critical).
    #[arg(long)]
    pub min_severity: Option<String>,

    /// Maximum number of events to return.
    #[arg(long, default_value_t = 200)]
    pub limit: usize,
}

// ---- summary ----

/// Count events per rule over a window.
#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Window start (RFC 3339, or relative like "7d"). Defaults to all time.
    #[arg(long)]
    pub since: Option<String>,

    /// Window end (RFC 3339, or relative like "1h").
    #[arg(long)]
    pub until: Option<String>,
}

// ---- rules ----

/// Show the effective rule set.
#[derive(Args, Debug)]
pub struct RulesArgs {}

// ---- config ----

/// Manage configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved configuration (file + env overrides).
    Show,
    /// Validate the configuration file and exit.
    Validate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_events_filters() {
        let cli = Cli::parse_from([
            "azlure",
            "events",
            "--since",
            "24h",
            "--rule",
            "sas_token_usage",
            "--limit",
            "10",
        ]);
        match cli.command {
            Commands::Events(args) => {
                assert_eq!(args.since.as_deref(), Some("24h"));
                assert_eq!(args.rule.as_deref(), Some("sas_token_usage"));
                assert_eq!(args.limit, 10);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_global_output_format() {
        let cli = Cli::parse_from(["azlure", "--output", "json", "status"]);
        assert!(matches!(cli.output, OutputFormat::Json));
    }

    #[test]
    fn parses_config_subcommand() {
        let cli = Cli::parse_from(["azlure", "config", "validate"]);
        match cli.command {
            Commands::Config(args) => assert!(matches!(args.action, ConfigAction::Validate)),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
