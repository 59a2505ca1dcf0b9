//! Bluetooth manager
//! This module provides the main interface for bluetooth operations. It owns
//! every component and is the single consumer of the platform event queue, so
//! events are applied strictly one after another.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::scan_config::ScanConfig;
use crate::core::bluetooth::constants::CONTROL_SERVICE;
use crate::core::bluetooth::device::DeviceRegistry;
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::permission::Authorizer;
use crate::core::bluetooth::platform::BlePlatform;
use crate::core::bluetooth::scanner::BluetoothScanner;
use crate::core::bluetooth::session::Session;
use crate::core::bluetooth::transport::MessageTransport;
use crate::core::bluetooth::types::PlatformEvent;

/// Handed to the platform so it can report events
pub type EventSender = mpsc::UnboundedSender<PlatformEvent>;

/// Manages Bluetooth operations
#[derive(Clone)]
pub struct BluetoothManager {
    /// Bluetooth scanner
    scanner: BluetoothScanner,
    /// The one session this process may run
    session: Arc<Session>,
    /// Message transport bound to the session
    transport: MessageTransport,
    /// Notification handler
    notification_handler: NotificationHandler,
    platform: Arc<dyn BlePlatform>,
    scan_window: Duration,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager
    pub fn new(
        platform: Arc<dyn BlePlatform>,
        authorizer: Arc<dyn Authorizer>,
        config: &ScanConfig,
    ) -> Self {
        let devices = Arc::new(Mutex::new(DeviceRegistry::new()));
        let scanner = BluetoothScanner::new(
            platform.clone(),
            authorizer.clone(),
            devices,
            config.include_unnamed,
        );
        let session = Arc::new(Session::new(platform.clone(), authorizer, CONTROL_SERVICE));
        let notification_handler = NotificationHandler::new();
        let transport = MessageTransport::new(session.clone(), notification_handler.clone());

        Self {
            scanner,
            session,
            transport,
            notification_handler,
            platform,
            scan_window: config.window(),
        }
    }

    pub fn scanner(&self) -> &BluetoothScanner {
        &self.scanner
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn transport(&self) -> &MessageTransport {
        &self.transport
    }

    pub fn notifications(&self) -> &NotificationHandler {
        &self.notification_handler
    }

    /// Starts a scan pass with the configured window
    pub fn start_scan(&self) -> Result<()> {
        self.scanner.start_scan(self.scan_window)?;
        Ok(())
    }

    pub fn stop_scan(&self) {
        self.scanner.stop_scan();
    }

    /// Connects to a device found by the last scan pass
    pub fn connect_device(&self, address: &str) -> Result<()> {
        let device = self
            .scanner
            .find_device(address)
            .ok_or_else(|| anyhow!("Device not found with address: {}", address))?;
        self.session.connect(device)?;
        Ok(())
    }

    /// Disconnects from the currently connected device
    pub fn disconnect(&self) -> bool {
        self.session.disconnect()
    }

    /// Stops scanning, disconnects and waits for the platform to finish
    /// releasing the link
    pub async fn shutdown(&self) {
        self.scanner.stop_scan();
        self.session.disconnect();
        self.platform.wait_released().await;
        info!("Bluetooth shut down");
    }

    /// Applies one platform event
    pub fn dispatch(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::DeviceFound {
                address,
                name,
                rssi,
                raw,
            } => {
                self.scanner.handle_device_found(address, name, rssi, raw);
            }
            PlatformEvent::ScanFailed { error_code } => {
                self.scanner.handle_scan_failed(error_code);
            }
            PlatformEvent::ConnectionStateChanged {
                address,
                connected,
                status,
            } => {
                self.session
                    .on_connection_state_changed(&address, connected, status);
            }
            PlatformEvent::ServicesDiscovered {
                address,
                status,
                services,
            } => {
                self.session
                    .on_services_discovered(&address, status, &services);
            }
            PlatformEvent::DescriptorWriteComplete {
                address,
                characteristic,
                descriptor,
                status,
            } => {
                self.session
                    .on_descriptor_write_complete(&address, characteristic, descriptor, status);
            }
            PlatformEvent::CharacteristicChanged {
                address,
                characteristic,
                value,
            } => {
                self.transport
                    .handle_notification(&address, characteristic, value);
            }
        }
    }

    /// Drains `events` until every sender is gone
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<PlatformEvent>) {
        info!("Event loop started");
        while let Some(event) = events.recv().await {
            debug!("Platform event: {:?}", event);
            self.dispatch(event);
        }
        info!("Event loop finished");
    }

    /// Spawns [`BluetoothManager::run`] on the current runtime
    pub fn spawn(&self, events: mpsc::UnboundedReceiver<PlatformEvent>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run(events))
    }
}
