//! Serial port stream provider and port discovery.

use super::{DynSerial, StreamProvider};
use crate::error::{AppResult, ConfiguratorError};
use async_trait::async_trait;
use serialport::{SerialPortInfo, SerialPortType};
use tokio::task::spawn_blocking;
use tokio_serial::SerialPortBuilderExt;

/// Opens a hardware serial port, 8N1 without flow control.
///
/// With no explicit path the first enumerated port is used.
#[derive(Debug, Clone, Default)]
pub struct SerialProvider {
    port: Option<String>,
}

impl SerialProvider {
    /// Provider for `port`, or for the first available port when `None`.
    pub fn new(port: Option<String>) -> Self {
        Self { port }
    }

    fn resolve_port(&self) -> AppResult<String> {
        if let Some(port) = &self.port {
            return Ok(port.clone());
        }
        let ports = available_ports()?;
        let first = ports.into_iter().next().ok_or_else(|| {
            ConfiguratorError::TransportUnavailable("no serial ports found".into())
        })?;
        tracing::debug!(port = %first.port_name, "auto-selected serial port");
        Ok(first.port_name)
    }
}

#[async_trait]
impl StreamProvider for SerialProvider {
    async fn open(&self, baud_rate: u32) -> AppResult<DynSerial> {
        let port_path = self.resolve_port()?;

        let stream = spawn_blocking(move || {
            tokio_serial::new(&port_path, baud_rate)
                .data_bits(tokio_serial::DataBits::Eight)
                .parity(tokio_serial::Parity::None)
                .stop_bits(tokio_serial::StopBits::One)
                .flow_control(tokio_serial::FlowControl::None)
                .open_native_async()
                .map_err(|source| ConfiguratorError::SerialOpen {
                    port: port_path,
                    source,
                })
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(Box::new(stream))
    }

    fn describe(&self) -> String {
        self.port.clone().unwrap_or_else(|| "first available port".to_string())
    }
}

/// Enumerates serial ports. A host without serial support is `TransportUnavailable`.
pub fn available_ports() -> AppResult<Vec<SerialPortInfo>> {
    serialport::available_ports()
        .map_err(|e| ConfiguratorError::TransportUnavailable(e.to_string()))
}

/// One-line description of a port for listings.
pub fn describe_port(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "{} (USB {:04x}:{:04x}{})",
            info.port_name,
            usb.vid,
            usb.pid,
            usb.product
                .as_deref()
                .map(|p| format!(" {p}"))
                .unwrap_or_default()
        ),
        SerialPortType::BluetoothPort => format!("{} (Bluetooth)", info.port_name),
        SerialPortType::PciPort => format!("{} (PCI)", info.port_name),
        SerialPortType::Unknown => info.port_name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn describe_names_explicit_port() {
        let provider = SerialProvider::new(Some("/dev/ttyACM0".into()));
        assert_eq!(provider.describe(), "/dev/ttyACM0");
        assert_eq!(SerialProvider::default().describe(), "first available port");
    }

    #[test]
    fn usb_ports_show_ids_and_product() {
        let info = SerialPortInfo {
            port_name: "/dev/ttyACM0".into(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2e8a,
                pid: 0x000a,
                serial_number: None,
                manufacturer: None,
                product: Some("Pico".into()),
            }),
        };
        assert_eq!(describe_port(&info), "/dev/ttyACM0 (USB 2e8a:000a Pico)");
    }

    #[tokio::test]
    async fn missing_explicit_port_fails_to_open() {
        let provider = SerialProvider::new(Some("/dev/does-not-exist-midi".into()));
        assert!(matches!(
            provider.open(115_200).await,
            Err(ConfiguratorError::SerialOpen { .. })
        ));
    }
}
