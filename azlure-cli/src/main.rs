//! azlure CLI entry point.

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // CLI defaults to quiet logging; --log-level or RUST_LOG opts in
    let level = cli.log_level.as_deref().unwrap_or("warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    let writer = OutputWriter::new(cli.output);

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, &writer).await,
        Commands::Status(args) => commands::status::execute(args, &cli.config, &writer).await,
        Commands::Events(args) => commands::events::execute(args, &cli.config, &writer).await,
        Commands::Summary(args) => commands::summary::execute(args, &cli.config, &writer).await,
        Commands::Rules(args) => commands::rules::execute(args, &cli.config, &writer).await,
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    };

    if let Err(e) = result {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}
