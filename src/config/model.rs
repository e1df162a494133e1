//! Typed configuration exchanged with the device.
//!
//! Everything in this module is in **wire semantics**: a `true` filter cell
//! means the message type is BLOCKED on that interface. The operator-facing
//! "allowed" polarity only exists inside [`crate::config::mapper`].
//!
//! Serialization order follows the firmware's JSON layout
//! (`command`, `filters`, `channels`, `imu`), so export and device-save share
//! one encoding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of physical MIDI interfaces on the device.
pub const INTERFACE_COUNT: usize = 3;
/// Number of filterable MIDI message types per interface.
pub const MESSAGE_TYPE_COUNT: usize = 8;
/// Number of MIDI channels.
pub const CHANNEL_COUNT: usize = 16;

/// Literal command identifier carried by every saved configuration.
pub const SAVE_COMMAND: &str = "SAVEALL";

/// 3×8 filter grid, indexed `[interface][message_type]`.
pub type FilterGrid = [[bool; MESSAGE_TYPE_COUNT]; INTERFACE_COUNT];

/// One flag per MIDI channel, `true` = channel is passed.
pub type ChannelMask = [bool; CHANNEL_COUNT];

/// Fixed `command` tag of a [`Configuration`]. Only serializes as `"SAVEALL"`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveAllTag {
    /// The save-all command.
    #[default]
    #[serde(rename = "SAVEALL")]
    SaveAll,
}

/// Full device configuration, the unit of state exchanged with the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Always [`SaveAllTag::SaveAll`].
    pub command: SaveAllTag,
    /// Blocked message types per interface (wire semantics).
    pub filters: FilterGrid,
    /// Enabled MIDI channels.
    pub channels: ChannelMask,
    /// Optional IMU-to-MIDI mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imu: Option<ImuConfig>,
}

impl Default for Configuration {
    /// Everything allowed, every channel passed, IMU axes at their defaults and disabled.
    fn default() -> Self {
        Self {
            command: SaveAllTag::SaveAll,
            filters: [[false; MESSAGE_TYPE_COUNT]; INTERFACE_COUNT],
            channels: [true; CHANNEL_COUNT],
            imu: Some(ImuConfig::new(
                AxisConfig::default_for(Axis::Roll),
                AxisConfig::default_for(Axis::Pitch),
                AxisConfig::default_for(Axis::Yaw),
            )),
        }
    }
}

impl Configuration {
    /// Returns the configuration with `imu.enabled` recomputed from the axes.
    pub fn with_derived_imu_enabled(mut self) -> Self {
        if let Some(imu) = self.imu.as_mut() {
            imu.refresh_enabled();
        }
        self
    }

    /// Whether `message` is blocked on `interface`.
    pub fn is_blocked(&self, interface: MidiInterface, message: MessageType) -> bool {
        self.filters[interface.index()][message.index()]
    }
}

/// IMU container: three axes plus the derived `enabled` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImuConfig {
    /// Logical OR of the three axis flags. Never set independently.
    pub enabled: bool,
    /// Roll axis mapping.
    pub roll: AxisConfig,
    /// Pitch axis mapping.
    pub pitch: AxisConfig,
    /// Yaw axis mapping.
    pub yaw: AxisConfig,
}

impl ImuConfig {
    /// Builds the container, deriving `enabled` from the axes.
    pub fn new(roll: AxisConfig, pitch: AxisConfig, yaw: AxisConfig) -> Self {
        let mut imu = Self {
            enabled: false,
            roll,
            pitch,
            yaw,
        };
        imu.refresh_enabled();
        imu
    }

    /// Recomputes `enabled` as the OR of the axis flags.
    pub fn refresh_enabled(&mut self) {
        self.enabled = self.roll.enabled || self.pitch.enabled || self.yaw.enabled;
    }

    /// Axis configuration by name.
    pub fn axis(&self, axis: Axis) -> &AxisConfig {
        match axis {
            Axis::Roll => &self.roll,
            Axis::Pitch => &self.pitch,
            Axis::Yaw => &self.yaw,
        }
    }

    /// Mutable axis configuration by name.
    pub fn axis_mut(&mut self, axis: Axis) -> &mut AxisConfig {
        match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
            Axis::Yaw => &mut self.yaw,
        }
    }
}

/// Per-axis sensor-to-MIDI mapping. All nine fields are always present on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AxisConfig {
    /// Whether this axis emits control changes.
    pub enabled: bool,
    /// MIDI channel, 1-16.
    pub channel: u8,
    /// Control-change number, 0-127.
    pub cc: u8,
    /// Value sent when the device is flat, 0-127.
    pub default_value: u8,
    /// Route to the serial MIDI port.
    pub to_serial: bool,
    /// Route to the USB device port.
    #[serde(rename = "toUSBDevice")]
    pub to_usb_device: bool,
    /// Route to the USB host port.
    #[serde(rename = "toUSBHost")]
    pub to_usb_host: bool,
    /// Angle multiplier, 0.1-10.0.
    pub sensitivity: f64,
    /// ±degrees mapped onto 0-127, 5-180.
    pub range: f64,
}

impl AxisConfig {
    /// Documented per-axis defaults, used when a device reply omits a field.
    pub fn default_for(axis: Axis) -> Self {
        let (cc, range) = match axis {
            Axis::Roll => (1, 45.0),
            Axis::Pitch => (2, 45.0),
            Axis::Yaw => (3, 90.0),
        };
        Self {
            enabled: false,
            channel: 1,
            cc,
            default_value: 64,
            to_serial: true,
            to_usb_device: true,
            to_usb_host: true,
            sensitivity: 1.0,
            range,
        }
    }
}

/// IMU rotation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Rotation around the longitudinal axis.
    Roll,
    /// Rotation around the lateral axis.
    Pitch,
    /// Rotation around the vertical axis.
    Yaw,
}

impl Axis {
    /// All axes in wire order.
    pub const ALL: [Axis; 3] = [Axis::Roll, Axis::Pitch, Axis::Yaw];

    /// JSON key of this axis inside `imu`.
    pub fn key(self) -> &'static str {
        match self {
            Axis::Roll => "roll",
            Axis::Pitch => "pitch",
            Axis::Yaw => "yaw",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Physical MIDI interface, first dimension of the filter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MidiInterface {
    /// Hardware serial (DIN) MIDI port.
    Serial,
    /// USB MIDI device port (connected to a computer).
    UsbDevice,
    /// USB MIDI host port (connected to MIDI devices).
    UsbHost,
}

impl MidiInterface {
    /// All interfaces in grid order.
    pub const ALL: [MidiInterface; INTERFACE_COUNT] = [
        MidiInterface::Serial,
        MidiInterface::UsbDevice,
        MidiInterface::UsbHost,
    ];

    /// Row index in the filter grid.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            MidiInterface::Serial => "Serial",
            MidiInterface::UsbDevice => "USB Device",
            MidiInterface::UsbHost => "USB Host",
        }
    }
}

/// Filterable MIDI message type, second dimension of the filter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum MessageType {
    /// Note On and Note Off.
    Note,
    /// Polyphonic (per-note) aftertouch.
    PolyAftertouch,
    /// Control change (knobs, sliders, pedals).
    ControlChange,
    /// Program change.
    ProgramChange,
    /// Channel pressure.
    ChannelAftertouch,
    /// Pitch bend.
    PitchBend,
    /// System exclusive.
    #[value(name = "sysex")]
    SysEx,
    /// Clock, start, stop, continue.
    Realtime,
}

impl MessageType {
    /// All message types in grid order.
    pub const ALL: [MessageType; MESSAGE_TYPE_COUNT] = [
        MessageType::Note,
        MessageType::PolyAftertouch,
        MessageType::ControlChange,
        MessageType::ProgramChange,
        MessageType::ChannelAftertouch,
        MessageType::PitchBend,
        MessageType::SysEx,
        MessageType::Realtime,
    ];

    /// Column index in the filter grid.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short display label.
    pub fn label(self) -> &'static str {
        match self {
            MessageType::Note => "Note",
            MessageType::PolyAftertouch => "PolyAT",
            MessageType::ControlChange => "CC",
            MessageType::ProgramChange => "PC",
            MessageType::ChannelAftertouch => "ChanAT",
            MessageType::PitchBend => "Bend",
            MessageType::SysEx => "SysEx",
            MessageType::Realtime => "RT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn command_tag_serializes_as_literal() {
        let value = serde_json::to_value(SaveAllTag::SaveAll).unwrap();
        assert_eq!(value, json!("SAVEALL"));
        assert!(serde_json::from_value::<SaveAllTag>(json!("READALL")).is_err());
    }

    #[test]
    fn axis_fields_use_firmware_names() {
        let value = serde_json::to_value(AxisConfig::default_for(Axis::Yaw)).unwrap();
        let keys: Vec<&str> = value
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        for key in [
            "enabled",
            "channel",
            "cc",
            "defaultValue",
            "toSerial",
            "toUSBDevice",
            "toUSBHost",
            "sensitivity",
            "range",
        ] {
            assert!(keys.contains(&key), "missing {key}");
        }
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn configuration_without_imu_omits_the_key() {
        let config = Configuration {
            imu: None,
            ..Configuration::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        assert!(text.starts_with("{\"command\":\"SAVEALL\",\"filters\":"));
        assert!(!text.contains("imu"));
    }

    #[test]
    fn imu_enabled_is_derived_from_axes() {
        let mut pitch = AxisConfig::default_for(Axis::Pitch);
        pitch.enabled = true;
        let imu = ImuConfig::new(
            AxisConfig::default_for(Axis::Roll),
            pitch,
            AxisConfig::default_for(Axis::Yaw),
        );
        assert!(imu.enabled);

        let mut config = Configuration {
            imu: Some(imu),
            ..Configuration::default()
        };
        if let Some(imu) = config.imu.as_mut() {
            imu.pitch.enabled = false;
        }
        let config = config.with_derived_imu_enabled();
        assert!(!config.imu.unwrap().enabled);
    }

    #[test]
    fn grid_indices_follow_firmware_enums() {
        assert_eq!(MidiInterface::UsbHost.index(), 2);
        assert_eq!(MessageType::Note.index(), 0);
        assert_eq!(MessageType::Realtime.index(), 7);

        let mut config = Configuration::default();
        config.filters[1][6] = true;
        assert!(config.is_blocked(MidiInterface::UsbDevice, MessageType::SysEx));
        assert!(!config.is_blocked(MidiInterface::Serial, MessageType::SysEx));
    }
}
