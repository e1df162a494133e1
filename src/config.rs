//! Device configuration model.
//!
//! - [`model`]: typed `Configuration`, IMU and per-axis settings in wire semantics.
//! - [`validation`]: structural validator run on untyped documents before any
//!   typed access.
//! - [`mapper`]: pure transforms between the operator's "allowed" view and the
//!   device's "blocked" view, plus axis defaulting for partial device replies.
//! - [`document`]: standalone JSON export/import sharing the wire serialization.

pub mod document;
pub mod mapper;
pub mod model;
pub mod validation;

pub use mapper::{ConfigForm, FormState, UiState};
pub use model::{
    Axis, AxisConfig, ChannelMask, Configuration, FilterGrid, ImuConfig, MessageType,
    MidiInterface, SaveAllTag,
};
pub use validation::{validate, Rule, ValidationError, Violation};
