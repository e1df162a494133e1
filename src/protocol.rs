//! Protocol Client for the device's line-delimited JSON command set.
//!
//! Protocol Overview:
//! - Format: one JSON value per line, UTF-8, `\n` terminated
//! - Baud: 115200, 8N1, no flow control
//! - `{"command":"READALL"}` → device answers with its configuration object,
//!   possibly preceded by log lines
//! - full `Configuration` object (`"command":"SAVEALL"`) → status/echo lines,
//!   a line containing `Success` acknowledges
//! - `{"command":"CALIBRATE_IMU"}` → progress lines, a line containing
//!   `complete` ends calibration
//!
//! Every exchange drains a fixed number of reply lines at most (5/3/10). An
//! exhausted budget is not an error: it only means the marker was not seen.
//! There is no timeout inside an exchange; a silent device is bounded by the
//! caller closing the transport.
//!
//! Exchange states: `Idle → Sending → AwaitingLines → (MarkerFound |
//! BudgetExhausted) → Idle`.

use crate::config::mapper::configuration_from_device;
use crate::config::model::Configuration;
use crate::config::validation::validate_configuration;
use crate::error::{AppResult, ConfiguratorError};
use crate::transport::LineTransport;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Reply lines read after `READALL` while looking for the configuration object.
pub const READ_ALL_BUDGET: usize = 5;
/// Reply lines read after a save while looking for [`SUCCESS_MARKER`].
pub const SAVE_ALL_BUDGET: usize = 3;
/// Reply lines read after `CALIBRATE_IMU` while looking for [`CALIBRATION_MARKER`].
pub const CALIBRATE_BUDGET: usize = 10;

/// Substring acknowledging a saved configuration.
pub const SUCCESS_MARKER: &str = "Success";
/// Substring announcing the end of IMU calibration.
pub const CALIBRATION_MARKER: &str = "complete";

/// Fixed command objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "command")]
pub enum Request {
    /// Ask for the current configuration and firmware version.
    #[serde(rename = "READALL")]
    ReadAll,
    /// Start IMU calibration.
    #[serde(rename = "CALIBRATE_IMU")]
    CalibrateImu,
}

impl Request {
    /// One-line JSON encoding, without the terminator.
    pub fn encode(self) -> AppResult<String> {
        Ok(serde_json::to_string(&self)?)
    }
}

/// Where an exchange currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// No exchange in progress.
    Idle,
    /// Request being written.
    Sending,
    /// Draining reply lines.
    AwaitingLines,
    /// The termination marker (or configuration object) was seen.
    MarkerFound,
    /// The line budget ran out first.
    BudgetExhausted,
}

/// How a marker-terminated exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A reply line contained the marker; draining stopped early.
    MarkerFound,
    /// All budgeted lines were read without seeing the marker.
    BudgetExhausted,
}

/// Result of a save or calibration exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    /// How draining ended.
    pub termination: Termination,
    /// Number of `read_line` calls made.
    pub lines_read: usize,
    /// Non-empty reply lines, in arrival order.
    pub replies: Vec<String>,
}

impl Ack {
    /// Whether the device positively acknowledged. A `false` ack still means
    /// the request was sent.
    pub fn confirmed(&self) -> bool {
        self.termination == Termination::MarkerFound
    }
}

/// Configuration reported by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// Decoded configuration (relaxed decoding, the device is trusted).
    pub config: Configuration,
    /// `version` field of the reply, if any.
    pub firmware_version: Option<String>,
    /// Non-empty reply lines read, the configuration line last.
    pub replies: Vec<String>,
}

/// Outcome of a `READALL` exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum CurrentConfig {
    /// The device answered with a configuration object.
    Received(DeviceConfig),
    /// No JSON object arrived within the budget.
    NotReceived {
        /// Lines read before giving up.
        attempts: usize,
        /// Non-empty lines that were read and discarded.
        replies: Vec<String>,
    },
}

/// Issues commands over a [`LineTransport`] and drains their replies.
///
/// One exchange at a time; `&mut self` on every command enforces that for a
/// single client. Sharing the transport between clients moves the obligation to
/// the caller.
pub struct ProtocolClient {
    transport: Arc<LineTransport>,
    state: ExchangeState,
}

impl ProtocolClient {
    /// Client over `transport`, which the caller owns and opens.
    pub fn new(transport: Arc<LineTransport>) -> Self {
        Self {
            transport,
            state: ExchangeState::Idle,
        }
    }

    /// Current exchange state.
    pub fn state(&self) -> ExchangeState {
        self.state
    }

    /// Requests the current configuration.
    ///
    /// Reads up to [`READ_ALL_BUDGET`] lines and returns the first one that is a
    /// JSON object. Other lines are logged and skipped.
    #[tracing::instrument(skip(self), err)]
    pub async fn read_all(&mut self) -> AppResult<CurrentConfig> {
        let result = self.read_all_inner().await;
        self.transition(ExchangeState::Idle);
        result
    }

    async fn read_all_inner(&mut self) -> AppResult<CurrentConfig> {
        self.ensure_connected()?;
        self.send_line(Request::ReadAll.encode()?).await?;

        self.transition(ExchangeState::AwaitingLines);
        let mut replies = Vec::new();
        for attempt in 1..=READ_ALL_BUDGET {
            let line = self.receive_line().await?;
            if !line.is_empty() {
                replies.push(line.clone());
            }
            match parse_reply_object(&line) {
                Ok(object) => {
                    self.transition(ExchangeState::MarkerFound);
                    let firmware_version = object
                        .get("version")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    if let Some(version) = &firmware_version {
                        tracing::info!(%version, "Firmware version");
                    }
                    let config = configuration_from_device(&Value::Object(object));
                    tracing::info!(attempt, "Config loaded from device");
                    return Ok(CurrentConfig::Received(DeviceConfig {
                        config,
                        firmware_version,
                        replies,
                    }));
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "skipping non-configuration reply");
                }
            }
        }

        self.transition(ExchangeState::BudgetExhausted);
        tracing::warn!(
            attempts = READ_ALL_BUDGET,
            "no configuration received from device"
        );
        Ok(CurrentConfig::NotReceived {
            attempts: READ_ALL_BUDGET,
            replies,
        })
    }

    /// Validates and transmits a full configuration.
    ///
    /// `imu.enabled` is recomputed before validation. On rejection nothing is
    /// sent and the error carries every violation.
    #[tracing::instrument(skip(self, config), err)]
    pub async fn save_all(&mut self, config: &Configuration) -> AppResult<Ack> {
        let result = self.save_all_inner(config).await;
        self.transition(ExchangeState::Idle);
        result
    }

    async fn save_all_inner(&mut self, config: &Configuration) -> AppResult<Ack> {
        self.ensure_connected()?;
        let outbound = config.clone().with_derived_imu_enabled();
        validate_configuration(&outbound)?;

        self.send_line(serde_json::to_string(&outbound)?).await?;
        let ack = self.drain_until(SAVE_ALL_BUDGET, SUCCESS_MARKER).await?;
        if ack.confirmed() {
            tracing::info!(lines_read = ack.lines_read, "Configuration saved by device");
        } else {
            tracing::warn!("Configuration sent, device did not confirm");
        }
        Ok(ack)
    }

    /// Starts IMU calibration and waits for the completion line.
    #[tracing::instrument(skip(self), err)]
    pub async fn calibrate_imu(&mut self) -> AppResult<Ack> {
        let result = self.calibrate_imu_inner().await;
        self.transition(ExchangeState::Idle);
        result
    }

    async fn calibrate_imu_inner(&mut self) -> AppResult<Ack> {
        self.ensure_connected()?;
        self.send_line(Request::CalibrateImu.encode()?).await?;
        let ack = self.drain_until(CALIBRATE_BUDGET, CALIBRATION_MARKER).await?;
        if ack.confirmed() {
            tracing::info!("IMU calibration complete");
        }
        Ok(ack)
    }

    fn ensure_connected(&self) -> AppResult<()> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(ConfiguratorError::NotConnected)
        }
    }

    fn transition(&mut self, next: ExchangeState) {
        tracing::trace!(from = ?self.state, to = ?next, "exchange state");
        self.state = next;
    }

    async fn send_line(&mut self, line: String) -> AppResult<()> {
        self.transition(ExchangeState::Sending);
        tracing::debug!(direction = "sent", %line);
        self.transport
            .write(&format!("{line}\n"))
            .await
            .map_err(not_open_to_not_connected)
    }

    async fn receive_line(&mut self) -> AppResult<String> {
        let line = self
            .transport
            .read_line()
            .await
            .map_err(not_open_to_not_connected)?;
        if !line.is_empty() {
            tracing::debug!(direction = "recv", %line);
        }
        Ok(line)
    }

    /// Reads up to `budget` lines, stopping at the first containing `marker`.
    async fn drain_until(&mut self, budget: usize, marker: &str) -> AppResult<Ack> {
        self.transition(ExchangeState::AwaitingLines);
        let mut replies = Vec::new();
        let mut lines_read = 0;
        while lines_read < budget {
            let line = self.receive_line().await?;
            lines_read += 1;
            let found = line.contains(marker);
            if !line.is_empty() {
                replies.push(line);
            }
            if found {
                self.transition(ExchangeState::MarkerFound);
                return Ok(Ack {
                    termination: Termination::MarkerFound,
                    lines_read,
                    replies,
                });
            }
        }
        self.transition(ExchangeState::BudgetExhausted);
        Ok(Ack {
            termination: Termination::BudgetExhausted,
            lines_read,
            replies,
        })
    }
}

fn not_open_to_not_connected(err: ConfiguratorError) -> ConfiguratorError {
    match err {
        ConfiguratorError::NotOpen => ConfiguratorError::NotConnected,
        other => other,
    }
}

/// Parses a reply line that is expected to hold a JSON object.
fn parse_reply_object(line: &str) -> AppResult<Map<String, Value>> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(ConfiguratorError::MalformedReply(format!(
            "not a JSON object: {line}"
        ))),
        Err(e) => Err(ConfiguratorError::MalformedReply(format!("{e}: {line}"))),
    }
}
