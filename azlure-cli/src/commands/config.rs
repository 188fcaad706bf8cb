//! `azlure config` command handler -- show and validate configuration.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use azlure_core::config::AzlureConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Show => {
            let config = AzlureConfig::load(config_path).await?;
            let rendered = toml::to_string_pretty(&config)?;
            writer.render(&ConfigReport {
                path: config_path.display().to_string(),
                valid: true,
                resolved: Some(rendered),
            })?;
        }
        ConfigAction::Validate => {
            // load() covers file parsing, env overrides, and validation
            let result = AzlureConfig::load(config_path).await;
            match result {
                Ok(_) => {
                    writer.render(&ConfigReport {
                        path: config_path.display().to_string(),
                        valid: true,
                        resolved: None,
                    })?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigReport {
    path: String,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolved: Option<String>,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        match &self.resolved {
            Some(resolved) => write!(w, "{resolved}")?,
            None => writeln!(w, "configuration OK: {}", self.path)?,
        }
        Ok(())
    }
}
