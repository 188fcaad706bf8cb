//! Prometheus exporter installation.
//!
//! Installs the `metrics-exporter-prometheus` recorder with an HTTP
//! listener when `[metrics]` is enabled. All pipeline counters defined
//! in `azlure_core::metrics` become scrapeable at `/metrics`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;

use azlure_core::config::MetricsConfig;

/// Install the global Prometheus recorder.
///
/// Must be called at most once, before the first metric is emitted.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid metrics bind address '{}'", config.bind))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus exporter")?;

    tracing::info!(bind = %addr, "metrics endpoint enabled");
    Ok(())
}
