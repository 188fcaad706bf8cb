//! CLI error type.
//!
//! Wraps domain errors from core and the ingest pipeline so command
//! handlers can use `?` uniformly.

use azlure_core::error::{AzlureError, IngestError, StoreError};

/// Errors surfaced by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("{0}")]
    Config(#[from] AzlureError),

    /// Event store access failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ingestion pass failure.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Invalid command-line argument value.
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// I/O failure while rendering output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization failure.
    #[error("toml error: {0}")]
    Toml(#[from] toml::ser::Error),
}
