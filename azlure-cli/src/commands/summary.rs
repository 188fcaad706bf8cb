//! `azlure summary` command handler -- per-rule event counts over a window.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use azlure_core::config::AzlureConfig;
use azlure_ingest::{EventStore, RuleCount};

use crate::cli::SummaryArgs;
use crate::commands::parse_time_arg;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `summary` command.
pub async fn execute(
    args: SummaryArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = AzlureConfig::load(config_path).await?;

    let from = args.since.as_deref().map(parse_time_arg).transpose()?;
    let until = args.until.as_deref().map(parse_time_arg).transpose()?;

    let store = EventStore::open_read_only(&config.storage.db_path)?;
    let counts = store.summarize(from, until)?;

    writer.render(&SummaryReport {
        window_from: from.map(|t| t.to_rfc3339()),
        window_until: until.map(|t| t.to_rfc3339()),
        rules: counts,
    })?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct SummaryReport {
    window_from: Option<String>,
    window_until: Option<String>,
    rules: Vec<RuleCount>,
}

impl Render for SummaryReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match (&self.window_from, &self.window_until) {
            (Some(from), Some(until)) => writeln!(w, "window: {from} .. {until}")?,
            (Some(from), None) => writeln!(w, "window: since {from}")?,
            (None, Some(until)) => writeln!(w, "window: until {until}")?,
            (None, None) => writeln!(w, "window: all time")?,
        }

        if self.rules.is_empty() {
            writeln!(w, "no events in window")?;
            return Ok(());
        }
        for rule in &self.rules {
            writeln!(
                w,
                "  {:<28} {:>6}  [{}]",
                rule.rule_id, rule.count, rule.severity
            )?;
        }
        Ok(())
    }
}
