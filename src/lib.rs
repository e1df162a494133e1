//! # MIDI Configurator Library
//!
//! Host-side client for the RP2040 MIDI filter. The device speaks
//! line-delimited JSON over a USB serial link; this crate reads its current
//! configuration, validates edits, sends them back and triggers IMU
//! calibration. The same library backs the `midi_configurator` CLI and can be
//! embedded in other frontends.
//!
//! ## Crate Structure
//!
//! - **`config`**: The wire `Configuration` model, the schema validator, the
//!   mapping between "allowed" checkboxes and wire "blocked" flags, and
//!   document import/export.
//! - **`error`**: The `ConfiguratorError` enum and `AppResult` alias.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`protocol`**: `ProtocolClient`, which issues `READALL`, `SAVEALL` and
//!   `CALIBRATE_IMU` and drains their replies.
//! - **`session`**: `Configurator`, the narrow host interface.
//! - **`settings`**: Figment-backed application settings.
//! - **`transport`**: The line transport over any async byte stream, and the
//!   serial port provider.

pub mod config;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod transport;

pub use config::{Configuration, UiState, ValidationError, Violation};
pub use error::{AppResult, ConfiguratorError};
pub use protocol::{Ack, CurrentConfig, DeviceConfig, ProtocolClient};
pub use session::Configurator;
pub use transport::{AttachedStream, LineTransport, StreamProvider};
