//! Application settings using Figment
//!
//! Settings are loaded from:
//! 1. `config/midi_configurator.toml` (optional base file)
//! 2. Environment variables prefixed with `MIDI_CONFIGURATOR_`, nested keys
//!    separated by `__` (e.g. `MIDI_CONFIGURATOR_SERIAL__PORT=/dev/ttyACM0`)
//!
//! # Example
//! ```no_run
//! use midi_configurator::settings::Settings;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Port: {:?}", settings.serial.port);
//! # Ok(())
//! # }
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default settings file location.
pub const DEFAULT_SETTINGS_PATH: &str = "config/midi_configurator.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Serial link settings
    #[serde(default)]
    pub serial: SerialSettings,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// CLI behaviour
    #[serde(default)]
    pub cli: CliSettings,
    /// Document export settings
    #[serde(default)]
    pub export: ExportSettings,
}

/// Serial link settings. The bit rate is fixed by the device and not configurable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerialSettings {
    /// Port path; the first enumerated port is used when unset
    #[serde(default)]
    pub port: Option<String>,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Log how long each device command took (span close events)
    #[serde(default)]
    pub span_timings: bool,
    /// Include source file and line in log lines
    #[serde(default)]
    pub file_lines: bool,
}

/// CLI behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CliSettings {
    /// Deadline in seconds for one device command, after which the CLI disconnects
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

/// Document export settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Default output path for exported configurations
    #[serde(default = "default_export_path")]
    pub path: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_command_timeout() -> u64 {
    10
}

fn default_export_path() -> PathBuf {
    PathBuf::from(crate::config::document::DEFAULT_EXPORT_FILE)
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            span_timings: false,
            file_lines: false,
        }
    }
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            path: default_export_path(),
        }
    }
}

impl Settings {
    /// Load settings from the default file and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_SETTINGS_PATH)
    }

    /// Load settings from a specific file path. A missing file yields defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("MIDI_CONFIGURATOR_").split("__"))
    }

    /// Validate settings after loading
    pub fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_formats.join(", ")
            ));
        }

        if self.cli.command_timeout_secs == 0 {
            return Err("Invalid command_timeout_secs 0. Must be at least 1".to_string());
        }

        if let Some(port) = &self.serial.port {
            if port.trim().is_empty() {
                return Err("Serial port path cannot be empty".to_string());
            }
        }

        Ok(())
    }
}
