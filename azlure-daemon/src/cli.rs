//! CLI argument definitions for azlure-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// AzLure log ingestion daemon.
///
/// Polls mirrored diagnostics containers, runs the detection rule set,
/// and records deduplicated events into the local store.
#[derive(Parser, Debug)]
#[command(name = "azlure-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to azlure.toml configuration file.
    #[arg(short, long, default_value = "/etc/azlure/azlure.toml")]
    pub config: PathBuf,

    /// Process one ingestion pass per category and exit.
    #[arg(long)]
    pub once: bool,

    /// Override the polling interval in seconds.
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let cli = DaemonCli::parse_from(["azlure-daemon"]);
        assert_eq!(cli.config, PathBuf::from("/etc/azlure/azlure.toml"));
        assert!(!cli.once);
        assert!(!cli.validate);
        assert_eq!(cli.poll_interval, None);
    }

    #[test]
    fn overrides_are_parsed() {
        let cli = DaemonCli::parse_from([
            "azlure-daemon",
            "--config",
            "/tmp/azlure.toml",
            "--once",
            "--poll-interval",
            "30",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.config, PathBuf::from("/tmp/azlure.toml"));
        assert!(cli.once);
        assert_eq!(cli.poll_interval, Some(30));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
