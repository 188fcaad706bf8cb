//! `azlure rules` command handler -- effective rule set display.

use std::io::Write;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use azlure_core::config::AzlureConfig;
use azlure_core::error::AzlureError;
use azlure_core::types::Severity;
use azlure_ingest::RuleSet;

use crate::cli::RulesArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `rules` command.
pub async fn execute(
    _args: RulesArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let config = AzlureConfig::load(config_path).await?;
    let rule_set = RuleSet::from_config(&config.rules).map_err(AzlureError::from)?;

    let rules = rule_set
        .rules()
        .iter()
        .map(|rule| RuleRow {
            id: rule.rule_id().to_owned(),
            title: rule.kind.title().to_owned(),
            severity: rule.severity(),
            enabled: rule.enabled,
        })
        .collect();

    writer.render(&RulesReport {
        rules,
        decoy_paths: config.rules.decoy_paths.clone(),
        decoy_match: config.rules.decoy_match.clone(),
        case_insensitive: config.rules.case_insensitive,
    })?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct RuleRow {
    id: String,
    title: String,
    severity: Severity,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct RulesReport {
    rules: Vec<RuleRow>,
    decoy_paths: Vec<String>,
    decoy_match: String,
    case_insensitive: bool,
}

impl Render for RulesReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        for rule in &self.rules {
            let state = if rule.enabled {
                "enabled".green()
            } else {
                "disabled".red()
            };
            writeln!(
                w,
                "{:<28} [{:<8}] {}  {}",
                rule.id,
                rule.severity.to_string(),
                state,
                rule.title,
            )?;
        }
        writeln!(
            w,
            "decoy paths ({} matching, case_insensitive={}): {}",
            self.decoy_match,
            self.case_insensitive,
            self.decoy_paths.join(", "),
        )?;
        Ok(())
    }
}
