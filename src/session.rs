//! Host-facing configurator session.
//!
//! [`Configurator`] is the narrow interface UI and CLI collaborators call:
//! connect, read the current configuration, submit a configuration, calibrate
//! the IMU, disconnect. It owns the transport handle explicitly; there is no
//! process-wide port.

use crate::config::model::Configuration;
use crate::error::AppResult;
use crate::protocol::{Ack, CurrentConfig, ProtocolClient};
use crate::transport::{LineTransport, StreamProvider};
use std::sync::Arc;

/// One operator session with one device.
pub struct Configurator {
    transport: Arc<LineTransport>,
    client: ProtocolClient,
}

impl Configurator {
    /// Session whose transport opens streams from `provider`.
    pub fn new(provider: Box<dyn StreamProvider>) -> Self {
        let transport = Arc::new(LineTransport::new(provider));
        let client = ProtocolClient::new(Arc::clone(&transport));
        Self { transport, client }
    }

    /// Shared handle to the transport, e.g. to close it from a teardown path
    /// while a command is waiting for the device.
    pub fn transport(&self) -> Arc<LineTransport> {
        Arc::clone(&self.transport)
    }

    /// Opens the transport.
    pub async fn connect(&mut self) -> AppResult<()> {
        self.transport.open().await
    }

    /// Whether the transport is open.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Reads the device's configuration (and firmware version, if reported).
    pub async fn request_current_config(&mut self) -> AppResult<CurrentConfig> {
        self.client.read_all().await
    }

    /// Validates and sends `config`. Rejected configurations are never transmitted.
    pub async fn submit_config(&mut self, config: &Configuration) -> AppResult<Ack> {
        self.client.save_all(config).await
    }

    /// Runs IMU calibration on the device.
    pub async fn calibrate_imu(&mut self) -> AppResult<Ack> {
        self.client.calibrate_imu().await
    }

    /// Closes the transport. Idempotent and best-effort.
    pub async fn disconnect(&self) {
        self.transport.close().await;
    }
}
