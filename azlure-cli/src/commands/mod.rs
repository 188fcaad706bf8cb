//! Subcommand handlers.
//!
//! Each submodule exposes an `execute` function taking its parsed args,
//! the config path, and the shared [`OutputWriter`](crate::output::OutputWriter).

pub mod config;
pub mod events;
pub mod rules;
pub mod run;
pub mod status;
pub mod summary;

use chrono::{DateTime, Duration, Utc};

use crate::error::CliError;

/// Parse a time argument: RFC 3339, or relative like "90m", "24h", "7d".
///
/// Relative values are interpreted as "that long before now".
pub(crate) fn parse_time_arg(raw: &str) -> Result<DateTime<Utc>, CliError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let (number, unit) = raw.split_at(raw.len().saturating_sub(1));
    let amount: i64 = number
        .parse()
        .map_err(|_| CliError::InvalidArg(format!("cannot parse time '{raw}'")))?;
    let delta = match unit {
        "m" => Duration::minutes(amount),
        "h" => Duration::hours(amount),
        "d" => Duration::days(amount),
        _ => {
            return Err(CliError::InvalidArg(format!(
                "cannot parse time '{raw}' (expected RFC 3339 or <n>m/<n>h/<n>d)"
            )));
        }
    };
    Ok(Utc::now() - delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let parsed = parse_time_arg("2024-06-01T12:00:00Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-06-01T12:00:00+00:00");
    }

    #[test]
    fn parses_relative_hours() {
        let parsed = parse_time_arg("24h").unwrap();
        let delta = Utc::now() - parsed;
        assert!((delta.num_hours() - 24).abs() <= 1);
    }

    #[test]
    fn parses_relative_days() {
        let parsed = parse_time_arg("7d").unwrap();
        assert!((Utc::now() - parsed).num_days() >= 6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_time_arg("yesterday").is_err());
        assert!(parse_time_arg("12x").is_err());
        assert!(parse_time_arg("").is_err());
    }
}
