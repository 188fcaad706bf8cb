//! `azlure status` command handler -- store totals and watermarks.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use azlure_core::config::AzlureConfig;
use azlure_core::types::{Severity, Watermark};
use azlure_ingest::EventStore;

use crate::cli::StatusArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `status` command.
///
/// Opens the store read-only; a daemon writing concurrently is not disturbed.
pub async fn execute(
    _args: StatusArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = AzlureConfig::load(config_path).await?;

    let report = match EventStore::open_read_only(&config.storage.db_path) {
        Ok(store) => {
            let totals = store.totals()?;
            StatusReport {
                db_path: config.storage.db_path.clone(),
                store_available: true,
                events: totals.events,
                by_severity: totals
                    .by_severity
                    .into_iter()
                    .map(|(severity, count)| SeverityRow { severity, count })
                    .collect(),
                watermarks: totals.watermarks,
            }
        }
        Err(_) => StatusReport {
            db_path: config.storage.db_path.clone(),
            store_available: false,
            events: 0,
            by_severity: Vec::new(),
            watermarks: Vec::new(),
        },
    };

    writer.render(&report)?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SeverityRow {
    severity: Severity,
    count: u64,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    db_path: String,
    store_available: bool,
    events: u64,
    by_severity: Vec<SeverityRow>,
    watermarks: Vec<Watermark>,
}

impl Render for StatusReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if !self.store_available {
            writeln!(
                w,
                "store not found at {} (run the daemon or `azlure run` first)",
                self.db_path
            )?;
            return Ok(());
        }

        writeln!(w, "store: {}", self.db_path)?;
        writeln!(w, "events: {}", self.events)?;
        for row in &self.by_severity {
            writeln!(w, "  {}: {}", row.severity, row.count)?;
        }
        if self.watermarks.is_empty() {
            writeln!(w, "watermarks: none (no pass completed yet)")?;
        } else {
            writeln!(w, "watermarks:")?;
            for mark in &self.watermarks {
                writeln!(
                    w,
                    "  {} -> {} (updated {})",
                    mark.category,
                    mark.object_id,
                    mark.updated_at.to_rfc3339(),
                )?;
            }
        }
        Ok(())
    }
}
