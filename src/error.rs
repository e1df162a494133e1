//! Custom error types for the configurator.
//!
//! This module defines the primary error type, `ConfiguratorError`, shared by the
//! transport, the protocol client, the configuration validator and the document
//! import/export path. Using the `thiserror` crate it gives every layer one
//! consistent way to report failures to the operator.
//!
//! ## Error Hierarchy
//!
//! - **`TransportUnavailable`**: the host has no serial port to offer at all.
//! - **`TransportBusy`**: `open()` was called while a stream is already held.
//! - **`NotOpen`**: a transport primitive was used before `open()` succeeded, or
//!   the transport was closed underneath a pending read.
//! - **`NotConnected`**: a protocol command was issued on a closed transport.
//! - **`Validation`**: a configuration document failed the schema check. Carries
//!   the full, ordered violation list.
//! - **`MalformedReply`**: a reply line was not a JSON object. The protocol client
//!   recovers from this locally by skipping the line; it is never surfaced from a
//!   command.
//!
//! None of these are fatal to the process. Every failure is recoverable by
//! reconnecting or by resubmitting a corrected configuration.

use crate::config::validation::ValidationError;
use thiserror::Error;

/// Convenience alias for results using the configurator error type.
pub type AppResult<T> = std::result::Result<T, ConfiguratorError>;

/// Primary error type for the configurator.
#[derive(Error, Debug)]
pub enum ConfiguratorError {
    #[error("Serial transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Serial transport is already open")]
    TransportBusy,

    #[error("Serial port not open")]
    NotOpen,

    #[error("Serial port not connected. Please connect first.")]
    NotConnected,

    #[error("Failed to open serial port '{port}': {source}")]
    SerialOpen {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("Malformed reply line: {0}")]
    MalformedReply(String),

    #[error("Settings error: {0}")]
    Settings(#[from] Box<figment::Error>),
}

impl From<figment::Error> for ConfiguratorError {
    fn from(value: figment::Error) -> Self {
        ConfiguratorError::Settings(Box::new(value))
    }
}

impl ConfiguratorError {
    /// Violations carried by a validation failure, if this is one.
    pub fn violations(&self) -> Option<&[crate::config::validation::Violation]> {
        match self {
            ConfiguratorError::Validation(err) => Some(err.violations()),
            _ => None,
        }
    }
}
