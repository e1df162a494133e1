//! Config Mapper: pure transforms between UI semantics and wire semantics.
//!
//! The operator sees a filter cell as "allowed" (checked box); the device stores
//! it as "blocked". The inversion happens here and nowhere else:
//! `wire = !ui` for every cell, and the map is its own inverse.
//!
//! This module also rebuilds typed values from partial device replies (older
//! firmware omits newer axis fields) and defines the small capability pair a
//! presentation layer implements to hand values in and out ([`ConfigForm`]).

use crate::config::model::{
    Axis, AxisConfig, ChannelMask, Configuration, FilterGrid, ImuConfig, MessageType,
    MidiInterface, SaveAllTag, CHANNEL_COUNT, INTERFACE_COUNT, MESSAGE_TYPE_COUNT,
};
use serde_json::Value;
use std::fmt;

/// Converts an "allowed" grid into the device's "blocked" grid.
pub fn to_wire(allowed: &FilterGrid) -> FilterGrid {
    invert(allowed)
}

/// Converts the device's "blocked" grid into an "allowed" grid.
pub fn to_ui(blocked: &FilterGrid) -> FilterGrid {
    invert(blocked)
}

fn invert(grid: &FilterGrid) -> FilterGrid {
    grid.map(|row| row.map(|cell| !cell))
}

/// Values as the operator sees them. Filter cells are in "allowed" polarity.
#[derive(Debug, Clone, PartialEq)]
pub struct UiState {
    /// `true` = message type passes on that interface.
    pub allowed: FilterGrid,
    /// `true` = channel passes.
    pub channels: ChannelMask,
    /// Roll axis controls.
    pub roll: AxisConfig,
    /// Pitch axis controls.
    pub pitch: AxisConfig,
    /// Yaw axis controls.
    pub yaw: AxisConfig,
}

impl Default for UiState {
    fn default() -> Self {
        ui_state_from(&Configuration::default())
    }
}

impl UiState {
    /// Axis controls by name.
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    /// Mutable axis controls by name.
    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisConfig {
        match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Yaw => &mut self.yaw,
        }
    }
}

/// Builds the outbound configuration from operator values.
///
/// `imu.enabled` is always recomputed from the three axis flags.
pub fn build_configuration(state: &UiState) -> Configuration {
    Configuration {
        command: SaveAllTag::SaveAll,
        filters: to_wire(&state.allowed),
        channels: state.channels,
        imu: Some(ImuConfig::new(
            state.roll.clone(),
            state.pitch.clone(),
            state.yaw.clone(),
        )),
    }
}

/// Operator values for a configuration. A missing IMU block yields axis defaults.
pub fn ui_state_from(config: &Configuration) -> UiState {
    let axis = |axis: Axis| {
        config
            .imu
            .as_ref()
            .map(|imu| imu.axis(axis).clone())
            .unwrap_or_else(|| AxisConfig::default_for(axis))
    };
    UiState {
        allowed: to_ui(&config.filters),
        channels: config.channels,
        roll: axis(Axis::Roll),
        pitch: axis(Axis::Pitch),
        yaw: axis(Axis::Yaw),
    }
}

/// Rebuilds one axis from a possibly partial wire object.
///
/// Absent or wrongly typed numbers fall back to the axis defaults, absent route
/// flags mean "on", and an absent `enabled` means off. Every fallback is
/// logged as a warning naming the axis and key.
pub fn axis_from_wire(axis: Axis, value: Option<&Value>) -> AxisConfig {
    let defaults = AxisConfig::default_for(axis);
    let Some(object) = value.and_then(Value::as_object) else {
        tracing::warn!(%axis, "device reply has no object for axis, using defaults");
        return defaults;
    };
    let repaired = |key: &str| {
        tracing::warn!(%axis, key, "device reply missing or invalid axis field, using default");
    };
    let flag = |key: &str, default: bool| {
        object.get(key).and_then(Value::as_bool).unwrap_or_else(|| {
            repaired(key);
            default
        })
    };
    let byte = |key: &str, default: u8| {
        object
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u8::try_from(n).ok())
            .unwrap_or_else(|| {
                repaired(key);
                default
            })
    };
    let float = |key: &str, default: f64| {
        object.get(key).and_then(Value::as_f64).unwrap_or_else(|| {
            repaired(key);
            default
        })
    };

    AxisConfig {
        enabled: flag("enabled", false),
        channel: byte("channel", defaults.channel),
        cc: byte("cc", defaults.cc),
        default_value: byte("defaultValue", defaults.default_value),
        to_serial: flag("toSerial", defaults.to_serial),
        to_usb_device: flag("toUSBDevice", defaults.to_usb_device),
        to_usb_host: flag("toUSBHost", defaults.to_usb_host),
        sensitivity: float("sensitivity", defaults.sensitivity),
        range: float("range", defaults.range),
    }
}

/// Relaxed decoder for a configuration reported by the device.
///
/// The firmware's reply carries no `command`, may carry `version` and
/// `destFilters`, and may predate the IMU fields. Unknown keys are ignored,
/// missing filter cells read as "not blocked" and missing channels as enabled.
pub fn configuration_from_device(reply: &Value) -> Configuration {
    let mut filters = [[false; MESSAGE_TYPE_COUNT]; INTERFACE_COUNT];
    match reply.get("filters").and_then(Value::as_array) {
        Some(rows) => {
            for (iface, row) in filters.iter_mut().enumerate() {
                let cells = rows.get(iface).and_then(Value::as_array);
                for (msg, cell) in row.iter_mut().enumerate() {
                    match cells.and_then(|c| c.get(msg)).and_then(Value::as_bool) {
                        Some(blocked) => *cell = blocked,
                        None => tracing::warn!(
                            iface,
                            msg,
                            "device reply missing filter cell, assuming not blocked"
                        ),
                    }
                }
            }
        }
        None => tracing::warn!("device reply has no filter grid, assuming nothing blocked"),
    }

    let mut channels = [true; CHANNEL_COUNT];
    match reply.get("channels").and_then(Value::as_array) {
        Some(flags) => {
            for (ch, enabled) in channels.iter_mut().enumerate() {
                match flags.get(ch).and_then(Value::as_bool) {
                    Some(flag) => *enabled = flag,
                    None => tracing::warn!(
                        channel = ch + 1,
                        "device reply missing channel flag, assuming enabled"
                    ),
                }
            }
        }
        None => tracing::warn!("device reply has no channel list, assuming all enabled"),
    }

    let imu = reply.get("imu").filter(|v| v.is_object()).map(|imu| {
        ImuConfig::new(
            axis_from_wire(Axis::Roll, imu.get("roll")),
            axis_from_wire(Axis::Pitch, imu.get("pitch")),
            axis_from_wire(Axis::Yaw, imu.get("yaw")),
        )
    });

    Configuration {
        command: SaveAllTag::SaveAll,
        filters,
        channels,
        imu,
    }
}

/// Capability pair a presentation layer implements.
///
/// The core never touches presentation state directly: it asks the form for
/// the current values and hands values back to be shown.
pub trait ConfigForm {
    /// Current values of the controls.
    fn read_values(&self) -> UiState;

    /// Replaces the controls' values.
    fn apply_values(&mut self, state: &UiState);

    /// Builds the outbound configuration from the current controls.
    fn to_configuration(&self) -> Configuration {
        build_configuration(&self.read_values())
    }

    /// Shows a configuration on the controls.
    fn show_configuration(&mut self, config: &Configuration) {
        self.apply_values(&ui_state_from(config));
    }
}

/// Headless form holding operator values in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    state: UiState,
}

impl FormState {
    /// Form showing `config`.
    pub fn from_configuration(config: &Configuration) -> Self {
        Self {
            state: ui_state_from(config),
        }
    }

    /// Ticks or clears the "allowed" box of one filter cell.
    pub fn set_allowed(&mut self, interface: MidiInterface, message: MessageType, allowed: bool) {
        self.state.allowed[interface.index()][message.index()] = allowed;
    }

    /// Enables or disables a 1-based MIDI channel. Returns `false` if out of range.
    pub fn set_channel(&mut self, channel: usize, enabled: bool) -> bool {
        match channel.checked_sub(1).and_then(|i| self.state.channels.get_mut(i)) {
            Some(slot) => {
                *slot = enabled;
                true
            }
            None => false,
        }
    }

    /// Mutable axis controls.
    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisConfig {
        self.state.axis_mut(axis)
    }
}

impl ConfigForm for FormState {
    fn read_values(&self) -> UiState {
        self.state.clone()
    }

    fn apply_values(&mut self, state: &UiState) {
        self.state = state.clone();
    }
}

fn tick(checked: bool) -> &'static str {
    if checked {
        "[x]"
    } else {
        "[ ]"
    }
}

impl fmt::Display for UiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Allowed messages")?;
        write!(f, "{:<12}", "")?;
        for message in MessageType::ALL {
            write!(f, "{:>7}", message.label())?;
        }
        writeln!(f)?;
        for interface in MidiInterface::ALL {
            write!(f, "{:<12}", interface.label())?;
            for message in MessageType::ALL {
                write!(f, "{:>7}", tick(self.allowed[interface.index()][message.index()]))?;
            }
            writeln!(f)?;
        }

        writeln!(f, "Channels")?;
        for (i, enabled) in self.channels.iter().enumerate() {
            write!(f, "{:>3}{}", i + 1, tick(*enabled))?;
            if i % 8 == 7 {
                writeln!(f)?;
            }
        }

        writeln!(f, "IMU")?;
        for axis in Axis::ALL {
            let a = self.axis(axis);
            writeln!(
                f,
                "  {:<5} {} ch {:>2} cc {:>3} default {:>3} sens {:>4} range {:>5}  \
                 serial {} usb-dev {} usb-host {}",
                axis.key(),
                tick(a.enabled),
                a.channel,
                a.cc,
                a.default_value,
                a.sensitivity,
                a.range,
                tick(a.to_serial),
                tick(a.to_usb_device),
                tick(a.to_usb_host),
            )?;
        }
        Ok(())
    }
}
