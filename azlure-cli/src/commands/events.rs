//! `azlure events` command handler -- filtered event queries.

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use azlure_core::config::AzlureConfig;
use azlure_core::types::{DetectionEvent, Severity};
use azlure_ingest::{EventFilter, EventStore};

use crate::cli::EventsArgs;
use crate::commands::parse_time_arg;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `events` command.
pub async fn execute(
    args: EventsArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = AzlureConfig::load(config_path).await?;

    let min_severity = args
        .min_severity
        .as_deref()
        .map(|raw| {
            Severity::from_str_loose(raw)
                .ok_or_else(|| CliError::InvalidArg(format!("unknown severity '{raw}'")))
        })
        .transpose()?;

    let filter = EventFilter {
        from: args.since.as_deref().map(parse_time_arg).transpose()?,
        until: args.until.as_deref().map(parse_time_arg).transpose()?,
        rule_id: args.rule,
        min_severity,
        limit: Some(args.limit),
    };

    let store = EventStore::open_read_only(&config.storage.db_path)?;
    let events = store.query(&filter)?;

    writer.render(&EventsReport { events })?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct EventsReport {
    events: Vec<DetectionEvent>,
}

impl Render for EventsReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.events.is_empty() {
            writeln!(w, "no events matched")?;
            return Ok(());
        }

        for event in &self.events {
            let severity = match event.severity {
                Severity::Critical | Severity::High => event.severity.to_string().red().bold(),
                Severity::Medium => event.severity.to_string().yellow(),
                Severity::Low | Severity::Info => event.severity.to_string().normal(),
            };
            writeln!(
                w,
                "{} [{}] {} {} ip={} {}",
                event.occurred_at.to_rfc3339(),
                severity,
                event.rule_id,
                event.operation,
                event.caller_ip.as_deref().unwrap_or("-"),
                event.request_uri.as_deref().unwrap_or("-"),
            )?;
        }
        writeln!(w, "{} event(s)", self.events.len())?;
        Ok(())
    }
}
