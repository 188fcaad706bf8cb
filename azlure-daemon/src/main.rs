//! azlure-daemon entry point.
//!
//! Loads configuration, spawns one ingestion coordinator per enabled
//! source category, and dispatches alerts for newly recorded events.
//! Coordinators share only the event store; cancellation is cooperative
//! and takes effect between objects.

mod alert;
mod cli;
mod logging;
mod metrics_server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use azlure_core::config::AzlureConfig;
use azlure_ingest::{
    CategoryCoordinator, DirSource, EventStore, MalformedPolicy, RetryPolicy, RuleSet,
};

use crate::alert::AlertDispatcher;
use crate::cli::DaemonCli;

/// Capacity of the coordinator -> dispatcher alert channel.
const ALERT_CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = AzlureConfig::load(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;

    // CLI arguments take precedence over file and environment values
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(poll) = cli.poll_interval {
        config.ingest.poll_interval_secs = poll;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(config = %cli.config.display(), "azlure-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
    }

    let store = Arc::new(
        EventStore::open(&config.storage.db_path)
            .map_err(|e| anyhow::anyhow!("failed to open event store: {}", e))?,
    );
    let rules = Arc::new(
        RuleSet::from_config(&config.rules)
            .map_err(|e| anyhow::anyhow!("failed to build rule set: {}", e))?,
    );
    let source = Arc::new(DirSource::from_config(&config.source));

    let categories = config.enabled_categories();
    tracing::info!(
        categories = categories.len(),
        rules = rules.enabled_count(),
        db = %config.storage.db_path,
        "pipeline initialized"
    );

    let (alert_tx, alert_rx) = mpsc::channel(ALERT_CHANNEL_CAPACITY);
    let dispatcher = AlertDispatcher::from_config(&config.alerts);
    let dispatcher_task = tokio::spawn(dispatcher.run(alert_rx));

    let cancel = CancellationToken::new();
    let retry = RetryPolicy::from_config(&config.ingest);
    let on_malformed = MalformedPolicy::from_config(&config.ingest);
    let poll_interval = Duration::from_secs(config.ingest.poll_interval_secs);

    if cli.once {
        // One-shot mode: run each category pass sequentially, then exit
        for category in categories {
            let coordinator = CategoryCoordinator::new(
                category,
                Arc::clone(&source),
                Arc::clone(&store),
                Arc::clone(&rules),
            )
            .with_retry_policy(retry.clone())
            .with_malformed_policy(on_malformed);

            match coordinator.run_once().await {
                Ok(report) => {
                    tracing::info!(category = %category, "pass complete: {report}");
                    for event in report.new_events {
                        let _ = alert_tx.send(event).await;
                    }
                }
                Err(e) => {
                    tracing::error!(category = %category, error = %e, "pass aborted");
                }
            }
        }
        drop(alert_tx);
        dispatcher_task.await?;
        return Ok(());
    }

    let mut tasks = Vec::new();
    for category in categories {
        let coordinator = CategoryCoordinator::new(
            category,
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::clone(&rules),
        )
        .with_retry_policy(retry.clone())
        .with_malformed_policy(on_malformed)
        .with_cancellation(cancel.clone())
        .with_alert_sender(alert_tx.clone());

        tasks.push(tokio::spawn(async move {
            coordinator.run_forever(poll_interval).await;
        }));
    }
    // Dispatcher exits once every coordinator clone of the sender is dropped
    drop(alert_tx);

    tracing::info!("azlure-daemon running — coordinators active");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    cancel.cancel();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "coordinator task panicked");
        }
    }
    dispatcher_task.await?;

    tracing::info!("azlure-daemon shut down");
    Ok(())
}
