//! CLI Entry Point for midi_configurator
//!
//! Device commands:
//! - `ports`: list serial ports
//! - `read`: print (and optionally export) the device's configuration
//! - `send FILE`: validate a document and write it to the device
//! - `calibrate`: run IMU calibration
//!
//! Offline commands work on exported documents and never open a port:
//! `check`, `init`, `filter`, `channel`, `show`.
//!
//! # Usage
//!
//! ```bash
//! midi_configurator --port /dev/ttyACM0 read --output current.json
//! midi_configurator filter current.json --interface usb-host --message sysex --block
//! midi_configurator --port /dev/ttyACM0 send current.json
//! ```
//!
//! Serial traffic is visible with `--log-level debug`.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use midi_configurator::config::document::{export_file, import_file};
use midi_configurator::config::mapper::ui_state_from;
use midi_configurator::config::validation::check;
use midi_configurator::config::{ConfigForm, Configuration, FormState, MessageType, MidiInterface};
use midi_configurator::protocol::{Ack, CurrentConfig};
use midi_configurator::settings::{Settings, DEFAULT_SETTINGS_PATH};
use midi_configurator::transport::serial::{available_ports, describe_port, SerialProvider};
use midi_configurator::transport::LineTransport;
use midi_configurator::{logging, Configurator};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "midi_configurator")]
#[command(about = "Configure the RP2040 MIDI filter over its serial port", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(long, global = true, default_value = DEFAULT_SETTINGS_PATH)]
    settings: PathBuf,

    /// Serial port path (overrides settings)
    #[arg(long, global = true)]
    port: Option<String>,

    /// Log level (overrides settings)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available serial ports
    Ports,

    /// Read the configuration currently stored on the device
    Read {
        /// Also export it to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration document and send it to the device
    Send {
        /// Configuration document
        file: PathBuf,
    },

    /// Run IMU calibration (keep the device flat and still)
    Calibrate,

    /// Validate a configuration document and list every violation
    Check {
        /// Configuration document
        file: PathBuf,
    },

    /// Write a document holding the default configuration
    Init {
        /// Output file (defaults to the configured export path)
        file: Option<PathBuf>,
    },

    /// Allow or block one message type on one interface
    Filter {
        /// Configuration document, edited in place
        file: PathBuf,

        /// MIDI interface
        #[arg(long, value_enum)]
        interface: MidiInterface,

        /// Message type
        #[arg(long, value_enum)]
        message: MessageType,

        #[command(flatten)]
        action: FilterAction,
    },

    /// Enable or disable one MIDI channel
    Channel {
        /// Configuration document, edited in place
        file: PathBuf,

        /// Channel number, 1-16
        #[arg(value_parser = clap::value_parser!(u8).range(1..=16))]
        channel: u8,

        #[command(flatten)]
        action: ChannelAction,
    },

    /// Print a configuration document as the operator sees it
    Show {
        /// Configuration document
        file: PathBuf,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct FilterAction {
    /// Let the message type through
    #[arg(long)]
    allow: bool,

    /// Drop the message type
    #[arg(long)]
    block: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ChannelAction {
    /// Let the channel through
    #[arg(long)]
    enable: bool,

    /// Drop the channel
    #[arg(long)]
    disable: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(&cli.settings)
        .with_context(|| format!("loading settings from {}", cli.settings.display()))?;
    if let Some(port) = cli.port {
        settings.serial.port = Some(port);
    }
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    settings.validate().map_err(|e| anyhow!(e))?;
    logging::init_from_settings(&settings).map_err(|e| anyhow!(e))?;

    match cli.command {
        Commands::Ports => list_ports(),
        Commands::Read { output } => read_config(&settings, output).await,
        Commands::Send { file } => send_config(&settings, file).await,
        Commands::Calibrate => calibrate(&settings).await,
        Commands::Check { file } => check_document(file).await,
        Commands::Init { file } => {
            let path = file.unwrap_or_else(|| settings.export.path.clone());
            export_file(&Configuration::default(), &path).await?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Filter {
            file,
            interface,
            message,
            action,
        } => {
            edit_document(&file, |form| {
                form.set_allowed(interface, message, action.allow);
                Ok(())
            })
            .await
        }
        Commands::Channel {
            file,
            channel,
            action,
        } => {
            edit_document(&file, |form| {
                if form.set_channel(usize::from(channel), action.enable) {
                    Ok(())
                } else {
                    bail!("channel {channel} is out of range")
                }
            })
            .await
        }
        Commands::Show { file } => {
            let config = import_file(&file).await?;
            print!("{}", ui_state_from(&config));
            Ok(())
        }
    }
}

fn list_ports() -> Result<()> {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for info in &ports {
        println!("{}", describe_port(info));
    }
    Ok(())
}

async fn connect(settings: &Settings) -> Result<Configurator> {
    let provider = SerialProvider::new(settings.serial.port.clone());
    let mut configurator = Configurator::new(Box::new(provider));
    configurator.connect().await?;
    Ok(configurator)
}

/// Closes the transport once the deadline passes, which settles any pending read.
fn arm_deadline(transport: Arc<LineTransport>, secs: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        tracing::warn!(secs, "device did not answer in time, disconnecting");
        transport.close().await;
    })
}

/// Maps the outcome of a device command, naming the deadline if it fired.
fn settle<T>(
    result: midi_configurator::AppResult<T>,
    deadline: JoinHandle<()>,
    secs: u64,
) -> Result<T> {
    let timed_out = deadline.is_finished();
    deadline.abort();
    match result {
        Err(_) if timed_out => bail!("no reply from device within {secs}s"),
        other => Ok(other?),
    }
}

async fn read_config(settings: &Settings, output: Option<PathBuf>) -> Result<()> {
    let mut configurator = connect(settings).await?;
    let secs = settings.cli.command_timeout_secs;
    let deadline = arm_deadline(configurator.transport(), secs);
    let result = configurator.request_current_config().await;
    let current = settle(result, deadline, secs);
    configurator.disconnect().await;

    match current? {
        CurrentConfig::Received(device) => {
            if let Some(version) = &device.firmware_version {
                println!("Firmware version: {version}");
            }
            print!("{}", ui_state_from(&device.config));
            if let Some(path) = output {
                export_file(&device.config, &path).await?;
                println!("Exported to {}", path.display());
            }
            Ok(())
        }
        CurrentConfig::NotReceived { attempts, replies } => {
            for line in &replies {
                eprintln!("  device: {line}");
            }
            bail!("no configuration received after {attempts} lines")
        }
    }
}

async fn send_config(settings: &Settings, file: PathBuf) -> Result<()> {
    let config = import_file(&file)
        .await
        .with_context(|| format!("{} is not a valid configuration", file.display()))?;

    let mut configurator = connect(settings).await?;
    let secs = settings.cli.command_timeout_secs;
    let deadline = arm_deadline(configurator.transport(), secs);
    let result = configurator.submit_config(&config).await;
    let ack = settle(result, deadline, secs);
    configurator.disconnect().await;

    report_ack(&ack?, "Configuration saved", "Configuration sent, no confirmation");
    Ok(())
}

async fn calibrate(settings: &Settings) -> Result<()> {
    println!("Calibrating IMU, keep the device flat and still...");
    let mut configurator = connect(settings).await?;
    let secs = settings.cli.command_timeout_secs;
    let deadline = arm_deadline(configurator.transport(), secs);
    let result = configurator.calibrate_imu().await;
    let ack = settle(result, deadline, secs);
    configurator.disconnect().await;

    report_ack(&ack?, "IMU calibration complete", "Calibration finished without confirmation");
    Ok(())
}

fn report_ack(ack: &Ack, confirmed: &str, unconfirmed: &str) {
    for line in &ack.replies {
        println!("  device: {line}");
    }
    if ack.confirmed() {
        println!("{confirmed}");
    } else {
        println!("{unconfirmed} ({} lines read)", ack.lines_read);
    }
}

async fn check_document(file: PathBuf) -> Result<()> {
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let document: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;

    let violations = check(&document);
    if violations.is_empty() {
        println!("{}: valid", file.display());
        return Ok(());
    }
    for violation in &violations {
        println!("{violation}");
    }
    bail!("{}: {} violation(s)", file.display(), violations.len())
}

async fn edit_document<F>(file: &PathBuf, edit: F) -> Result<()>
where
    F: FnOnce(&mut FormState) -> Result<()>,
{
    let config = import_file(file).await?;
    let mut form = FormState::from_configuration(&config);
    edit(&mut form)?;
    export_file(&form.to_configuration(), file).await?;
    println!("Updated {}", file.display());
    Ok(())
}
