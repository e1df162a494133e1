//! Standalone configuration documents.
//!
//! An exported document is the wire `Configuration` itself, pretty-printed,
//! with no envelope. Import parses to an untyped value, runs the validator and
//! only then decodes into the typed configuration.
//!
//! Both directions recompute `imu.enabled` from the axes, so a document never
//! disagrees with what a device save would send.

use crate::config::model::Configuration;
use crate::config::validation::{validate, validate_configuration};
use crate::error::AppResult;
use serde_json::Value;
use std::path::Path;

/// Default file name for exported documents.
pub const DEFAULT_EXPORT_FILE: &str = "rp2040-midi-config.json";

/// Serializes a validated configuration as a pretty-printed document.
///
/// Encodes the typed value (not the validated `Value`) to keep the firmware's
/// key order.
pub fn export_to_string(config: &Configuration) -> AppResult<String> {
    let normalized = config.clone().with_derived_imu_enabled();
    validate_configuration(&normalized)?;
    Ok(serde_json::to_string_pretty(&normalized)?)
}

/// Parses and validates a document.
pub fn import_from_str(text: &str) -> AppResult<Configuration> {
    let document: Value = serde_json::from_str(text)?;
    import_value(document)
}

/// Validates an already parsed document and decodes it.
pub fn import_value(document: Value) -> AppResult<Configuration> {
    validate(&document)?;
    let config: Configuration = serde_json::from_value(document)?;
    Ok(config.with_derived_imu_enabled())
}

/// Writes `config` to `path`.
pub async fn export_file(config: &Configuration, path: impl AsRef<Path>) -> AppResult<()> {
    let path = path.as_ref();
    let mut text = export_to_string(config)?;
    text.push('\n');
    tokio::fs::write(path, text).await?;
    tracing::info!(path = %path.display(), "Config exported");
    Ok(())
}

/// Reads, validates and decodes the document at `path`.
pub async fn import_file(path: impl AsRef<Path>) -> AppResult<Configuration> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path).await?;
    let config = import_from_str(&text)?;
    tracing::info!(path = %path.display(), "Config file loaded");
    Ok(config)
}
