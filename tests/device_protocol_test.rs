//! Protocol exchanges against a simulated device on an in-memory duplex stream.
//!
//! Replies are queued on the device end before the command runs, so each test
//! is deterministic without a device task.

use midi_configurator::config::{Axis, Configuration, MessageType, MidiInterface};
use midi_configurator::protocol::{
    CurrentConfig, ExchangeState, ProtocolClient, Termination, CALIBRATE_BUDGET, READ_ALL_BUDGET,
};
use midi_configurator::transport::{AttachedStream, LineTransport};
use midi_configurator::{Configurator, ConfiguratorError};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing_test::traced_test;

/// Device end of the link.
struct SimulatedDevice {
    io: BufReader<DuplexStream>,
}

impl SimulatedDevice {
    async fn queue(&mut self, lines: &[&str]) {
        for line in lines {
            self.io.write_all(line.as_bytes()).await.unwrap();
            self.io.write_all(b"\n").await.unwrap();
        }
    }

    async fn received_line(&mut self) -> String {
        let mut line = String::new();
        self.io.read_line(&mut line).await.unwrap();
        line
    }
}

fn attached_pair() -> (Configurator, SimulatedDevice) {
    let (host, device) = tokio::io::duplex(8192);
    let configurator = Configurator::new(Box::new(AttachedStream::new(Box::new(host))));
    (
        configurator,
        SimulatedDevice {
            io: BufReader::new(device),
        },
    )
}

async fn connected_pair() -> (Configurator, SimulatedDevice) {
    let (mut configurator, device) = attached_pair();
    configurator.connect().await.unwrap();
    (configurator, device)
}

fn axis(cc: u8, range: f64, enabled: bool) -> Value {
    json!({
        "enabled": enabled,
        "channel": 1,
        "cc": cc,
        "defaultValue": 64,
        "toSerial": true,
        "toUSBDevice": false,
        "toUSBHost": true,
        "sensitivity": 1.5,
        "range": range
    })
}

/// What the firmware prints in reply to READALL: no `command`, plus
/// `destFilters` and `version`.
fn firmware_reply() -> String {
    let mut filters = vec![vec![false; 8]; 3];
    filters[2][6] = true;
    let mut channels = vec![true; 16];
    channels[9] = false;
    json!({
        "filters": filters,
        "destFilters": vec![vec![false; 3]; 3],
        "channels": channels,
        "imu": {
            "enabled": true,
            "roll": axis(1, 45.0, false),
            "pitch": axis(2, 45.0, true),
            "yaw": axis(3, 90.0, false)
        },
        "version": "1.4.2"
    })
    .to_string()
}

#[tokio::test]
async fn test_read_all_returns_configuration_and_version() {
    let (mut configurator, mut device) = connected_pair().await;
    device.queue(&["MIDI filter ready", &firmware_reply()]).await;

    let current = configurator.request_current_config().await.unwrap();
    assert_eq!(device.received_line().await, "{\"command\":\"READALL\"}\n");

    let CurrentConfig::Received(reply) = current else {
        panic!("expected a configuration");
    };
    assert_eq!(reply.firmware_version.as_deref(), Some("1.4.2"));
    assert_eq!(reply.replies.len(), 2);
    assert!(reply
        .config
        .is_blocked(MidiInterface::UsbHost, MessageType::SysEx));
    assert!(!reply
        .config
        .is_blocked(MidiInterface::Serial, MessageType::SysEx));
    assert!(!reply.config.channels[9]);

    let imu = reply.config.imu.unwrap();
    assert!(imu.enabled);
    assert!(imu.pitch.enabled);
    assert!(!imu.pitch.to_usb_device);
    assert_eq!(imu.yaw.range, 90.0);
}

#[tokio::test]
async fn test_read_all_stops_after_budget() {
    let (mut configurator, mut device) = connected_pair().await;
    device
        .queue(&["boot 1", "boot 2", "boot 3", "boot 4", "boot 5", "sixth"])
        .await;

    let current = configurator.request_current_config().await.unwrap();
    match current {
        CurrentConfig::NotReceived { attempts, replies } => {
            assert_eq!(attempts, READ_ALL_BUDGET);
            assert_eq!(replies.len(), 5);
            assert_eq!(replies[4], "boot 5");
        }
        other => panic!("expected no configuration, got {other:?}"),
    }

    // The sixth line was never consumed.
    let transport = configurator.transport();
    assert_eq!(transport.read_line().await.unwrap(), "sixth");
}

#[tokio::test]
async fn test_read_all_with_partial_imu_uses_axis_defaults() {
    let (mut configurator, mut device) = connected_pair().await;
    let reply = json!({
        "filters": vec![vec![false; 8]; 3],
        "channels": vec![true; 16],
        "imu": { "roll": { "enabled": true, "channel": 4 } }
    })
    .to_string();
    device.queue(&[&reply]).await;

    let CurrentConfig::Received(reply) = configurator.request_current_config().await.unwrap()
    else {
        panic!("expected a configuration");
    };
    let imu = reply.config.imu.unwrap();
    assert_eq!(imu.roll.channel, 4);
    assert_eq!(imu.roll.cc, 1);
    assert_eq!(imu.roll.default_value, 64);
    assert!(imu.roll.to_usb_host);
    assert_eq!(imu.yaw.range, 90.0);
    assert!(imu.enabled);
    assert!(reply.firmware_version.is_none());
}

#[tokio::test]
async fn test_save_all_end_to_end() {
    let (mut configurator, mut device) = connected_pair().await;
    device.queue(&["OK Success"]).await;

    let ack = configurator
        .submit_config(&Configuration::default())
        .await
        .unwrap();
    assert!(ack.confirmed());
    assert_eq!(ack.lines_read, 1);
    assert_eq!(ack.replies, vec!["OK Success".to_string()]);

    let sent = device.received_line().await;
    assert!(sent.starts_with("{\"command\":\"SAVEALL\",\"filters\":"));
    assert!(sent.ends_with('\n'));
    let value: Value = serde_json::from_str(&sent).unwrap();
    assert_eq!(value["channels"].as_array().unwrap().len(), 16);
    assert_eq!(value["imu"]["enabled"], false);
}

#[tokio::test]
async fn test_save_all_recomputes_imu_enabled() {
    let (mut configurator, mut device) = connected_pair().await;
    device.queue(&["Success"]).await;

    let mut config = Configuration::default();
    if let Some(imu) = config.imu.as_mut() {
        imu.axis_mut(Axis::Yaw).enabled = true;
        imu.enabled = false;
    }
    configurator.submit_config(&config).await.unwrap();

    let value: Value = serde_json::from_str(&device.received_line().await).unwrap();
    assert_eq!(value["imu"]["enabled"], true);
    assert_eq!(value["imu"]["yaw"]["enabled"], true);
}

#[tokio::test]
async fn test_save_all_without_marker_reads_exactly_three_lines() {
    let (mut configurator, mut device) = connected_pair().await;
    device
        .queue(&["saving", "", "{\"status\":\"wrote flash\"}", "late Success"])
        .await;

    let ack = configurator
        .submit_config(&Configuration::default())
        .await
        .unwrap();
    assert!(!ack.confirmed());
    assert_eq!(ack.termination, Termination::BudgetExhausted);
    assert_eq!(ack.lines_read, 3);
    assert_eq!(ack.replies.len(), 2);

    let transport = configurator.transport();
    assert_eq!(transport.read_line().await.unwrap(), "late Success");
}

#[tokio::test]
async fn test_invalid_configuration_is_never_sent() {
    let (mut configurator, mut device) = connected_pair().await;

    let mut config = Configuration::default();
    if let Some(imu) = config.imu.as_mut() {
        imu.axis_mut(Axis::Roll).cc = 128;
        imu.axis_mut(Axis::Pitch).sensitivity = 0.05;
    }
    let err = configurator.submit_config(&config).await.unwrap_err();
    let paths: Vec<&str> = err
        .violations()
        .unwrap()
        .iter()
        .map(|v| v.path.as_str())
        .collect();
    assert_eq!(paths, vec!["/imu/roll/cc", "/imu/pitch/sensitivity"]);

    drop(configurator);
    let mut sent = String::new();
    device.io.read_to_string(&mut sent).await.unwrap();
    assert!(sent.is_empty());
}

#[tokio::test]
async fn test_calibrate_stops_at_complete_marker() {
    let (mut configurator, mut device) = connected_pair().await;
    device
        .queue(&["Calibrating IMU...", "IMU calibration complete", "extra"])
        .await;

    let ack = configurator.calibrate_imu().await.unwrap();
    assert_eq!(
        device.received_line().await,
        "{\"command\":\"CALIBRATE_IMU\"}\n"
    );
    assert!(ack.confirmed());
    assert_eq!(ack.lines_read, 2);
    assert!(ack.lines_read <= CALIBRATE_BUDGET);
}

#[tokio::test]
async fn test_commands_before_connect_are_not_connected() {
    let (mut configurator, _device) = attached_pair();
    assert!(!configurator.is_connected());

    assert!(matches!(
        configurator.request_current_config().await,
        Err(ConfiguratorError::NotConnected)
    ));
    assert!(matches!(
        configurator.submit_config(&Configuration::default()).await,
        Err(ConfiguratorError::NotConnected)
    ));
    let err = configurator.calibrate_imu().await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Serial port not connected. Please connect first."
    );
}

#[tokio::test]
async fn test_disconnect_settles_a_silent_device() {
    let (host, _device) = tokio::io::duplex(256);
    let transport = Arc::new(LineTransport::new(Box::new(AttachedStream::new(Box::new(
        host,
    )))));
    transport.open().await.unwrap();

    let mut client = ProtocolClient::new(Arc::clone(&transport));
    let pending = tokio::spawn(async move {
        let result = client.read_all().await;
        (result, client.state())
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    transport.close().await;
    let (result, state) = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("read must settle after close")
        .unwrap();
    assert!(matches!(result, Err(ConfiguratorError::NotConnected)));
    assert_eq!(state, ExchangeState::Idle);
}

#[tokio::test]
async fn test_reconnect_after_disconnect_needs_new_stream() {
    let (mut configurator, _device) = connected_pair().await;
    assert!(matches!(
        configurator.connect().await,
        Err(ConfiguratorError::TransportBusy)
    ));

    configurator.disconnect().await;
    configurator.disconnect().await;
    assert!(!configurator.is_connected());
    assert!(matches!(
        configurator.connect().await,
        Err(ConfiguratorError::TransportUnavailable(_))
    ));
}

#[tokio::test]
#[traced_test]
async fn test_skipped_lines_and_traffic_are_logged() {
    let (mut configurator, mut device) = connected_pair().await;
    device.queue(&["not json", &firmware_reply()]).await;

    configurator.request_current_config().await.unwrap();

    assert!(logs_contain("skipping non-configuration reply"));
    assert!(logs_contain("\"sent\""));
    assert!(logs_contain("\"recv\""));
    assert!(logs_contain("Firmware version"));
}

#[tokio::test]
#[traced_test]
async fn test_axis_repairs_are_logged() {
    let (mut configurator, mut device) = connected_pair().await;
    let reply = json!({
        "filters": vec![vec![false; 8]; 3],
        "channels": vec![true; 16],
        "imu": {
            "roll": { "enabled": true, "channel": 4, "cc": 300 },
            "pitch": axis(2, 45.0, true),
            "yaw": axis(3, 90.0, false)
        }
    })
    .to_string();
    device.queue(&[&reply]).await;

    let CurrentConfig::Received(reply) = configurator.request_current_config().await.unwrap()
    else {
        panic!("expected a configuration");
    };
    assert_eq!(reply.config.imu.unwrap().roll.cc, 1);

    assert!(logs_contain("device reply missing or invalid axis field, using default"));
    assert!(logs_contain("axis=roll"));
    assert!(logs_contain("defaultValue"));
    assert!(logs_contain("sensitivity"));
    assert!(!logs_contain("axis=pitch"));
    assert!(!logs_contain("axis=yaw"));
}
