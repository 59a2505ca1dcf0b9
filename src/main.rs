use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use ble_remote_control_lib::config::{AppConfig, CONFIG_FILE_NAME};
use ble_remote_control_lib::core::bluetooth::{
    AllowAll, BluestPlatform, BluetoothManager, CommandExecutor, OffsetSelector, ScanEvent,
    SessionEvent, SessionState,
};
use ble_remote_control_lib::logging::setup_logging;
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;

/// How long to wait for the session to become ready
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// How long to wait for the link to be released on exit
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

#[derive(Parser)]
#[command(name = "ble-remote-control", version, about = "Talk to the remote control peripheral over BLE")]
struct Cli {
    /// Path of the JSON configuration file
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scan pass and list the named devices found
    Scan,
    /// Scan, connect to a device, send control messages and print replies
    Run {
        /// Address of the device, as printed by `scan`
        #[arg(long)]
        device: String,
        /// Toggle state to send
        #[arg(long, value_enum)]
        mode: Option<Mode>,
        /// Slider offset to send
        #[arg(long, allow_hyphen_values = true)]
        offset: Option<i32>,
        /// How long to print incoming messages before disconnecting
        #[arg(long, default_value_t = 10)]
        listen_secs: u64,
    },
    /// Write the default configuration file
    InitConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_config(&cli.config).await?;
    setup_logging(config.log_level());

    if let Command::InitConfig = cli.command {
        return config.save_config(&cli.config).await;
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let platform = Arc::new(BluestPlatform::new(events_tx).await?);
    let manager = BluetoothManager::new(platform, Arc::new(AllowAll), &config.scan);
    let pump = manager.spawn(events_rx);

    let result = match cli.command {
        Command::Scan => scan(&manager).await,
        Command::Run {
            device,
            mode,
            offset,
            listen_secs,
        } => run(&manager, &config, &device, mode, offset, listen_secs).await,
        Command::InitConfig => Ok(()),
    };

    if tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), manager.shutdown())
        .await
        .is_err()
    {
        warn!("Timed out waiting for the device to disconnect");
    }
    pump.abort();
    result
}

/// Runs one scan pass to completion
async fn scan(manager: &BluetoothManager) -> Result<()> {
    let mut events = manager.scanner().subscribe();
    manager.start_scan()?;
    println!("Scanning...");

    loop {
        match events.recv().await {
            Ok(ScanEvent::DeviceFound(device)) => {
                println!("  {}  {}", device.address, device.display_name());
            }
            Ok(ScanEvent::Stopped(reason)) => {
                info!("Scan finished: {:?}", reason);
                break;
            }
            Ok(ScanEvent::Failed(e)) => return Err(e.into()),
            Ok(ScanEvent::Started) => {}
            Err(RecvError::Lagged(skipped)) => warn!("Missed {} scan events", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    println!("{} device(s) found.", manager.scanner().devices().len());
    Ok(())
}

async fn run(
    manager: &BluetoothManager,
    config: &AppConfig,
    device: &str,
    mode: Option<Mode>,
    offset: Option<i32>,
    listen_secs: u64,
) -> Result<()> {
    scan(manager).await?;

    let session = manager.session();
    let mut session_events = session.subscribe();
    manager.connect_device(device)?;

    tokio::time::timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS), async {
        loop {
            match session_events.recv().await {
                Ok(SessionEvent::StateChanged(SessionState::Ready)) => return Ok(()),
                Ok(SessionEvent::StateChanged(SessionState::Disconnected)) => {
                    return Err(match session.last_error() {
                        Some(e) => anyhow!(e),
                        None => anyhow!("Device disconnected"),
                    });
                }
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Err(anyhow!("Session closed")),
            }
        }
    })
    .await
    .map_err(|_| anyhow!("Timed out waiting for {} to become ready", device))??;
    println!("Connected to {}.", device);

    let (_, mut inbox) = manager.notifications().subscribe_channel();
    let offsets = OffsetSelector::new(config.control.offset_steps.clone())?;
    let mut executor = CommandExecutor::new(manager.transport().clone(), offsets);

    if let Some(mode) = mode {
        executor.set_mode(matches!(mode, Mode::On)).await?;
    }
    if let Some(offset) = offset {
        executor.send_offset(offset).await?;
    }

    let _ = tokio::time::timeout(Duration::from_secs(listen_secs), async {
        while let Some(message) = inbox.recv().await {
            println!("< {}", message.text());
        }
    })
    .await;

    Ok(())
}
