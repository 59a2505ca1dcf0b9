//! Platform implementation on top of `bluest`
//! Each request spawns a task that performs the async bluest call and reports the
//! outcome on the manager's event queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::anyhow;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::core::bluetooth::constants::{GATT_SUCCESS, UUID_CLIENT_CHARACTERISTIC_CONFIG};
use crate::core::bluetooth::manager::EventSender;
use crate::core::bluetooth::platform::{BlePlatform, DescriptorWrite, GattConnection};
use crate::core::bluetooth::types::{
    CharacteristicRef, GattCharacteristic, GattService, PeripheralHandle, PlatformEvent,
    RawPeripheral,
};
use crate::error::{BleError, Result};

/// Generic failure status, as reported by most stacks
const GATT_FAILURE: i32 = 0x101;

/// Scan could not be started or the scan stream failed
const SCAN_FAILED_INTERNAL_ERROR: i32 = 3;

type CharacteristicCache = Arc<Mutex<HashMap<CharacteristicRef, Characteristic>>>;

fn runtime() -> Result<Handle> {
    Handle::try_current().map_err(|_| BleError::NoRuntime)
}

pub struct BluestPlatform {
    adapter: Adapter,
    events: EventSender,
    scan_token: Mutex<Option<CancellationToken>>,
    /// Disconnects still in flight for closed connections
    releases: TaskTracker,
}

impl BluestPlatform {
    /// Opens the default adapter and waits until it is powered on
    pub async fn new(events: EventSender) -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| anyhow!("No Bluetooth adapter found"))?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            adapter,
            events,
            scan_token: Mutex::new(None),
            releases: TaskTracker::new(),
        })
    }

    fn device_found(device: Device, local_name: Option<String>, rssi: Option<i16>) -> PlatformEvent {
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or(id);
        let name = local_name.or_else(|| device.name().ok());
        PlatformEvent::DeviceFound {
            address,
            name,
            rssi,
            raw: RawPeripheral::new(device),
        }
    }

    async fn scan_task(adapter: Adapter, events: EventSender, cancel_token: CancellationToken) {
        // Peripherals already connected to the host do not advertise
        match adapter.connected_devices().await {
            Ok(devices) => {
                for device in devices {
                    let _ = events.send(Self::device_found(device, None, None));
                }
            }
            Err(e) => debug!("Could not list connected devices: {}", e),
        }

        info!("Starting bluetooth scan");
        let mut scan_stream = match adapter.scan(&[]).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to start scan: {}", e);
                let _ = events.send(PlatformEvent::ScanFailed {
                    error_code: SCAN_FAILED_INTERNAL_ERROR,
                });
                return;
            }
        };

        loop {
            tokio::select! {
                result = scan_stream.next() => {
                    match result {
                        Some(discovered) => {
                            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);
                            let event = Self::device_found(
                                discovered.device,
                                discovered.adv_data.local_name,
                                discovered.rssi,
                            );
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        None => {
                            info!("Bluetooth scan stream has ended.");
                            break;
                        }
                    }
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl BlePlatform for BluestPlatform {
    fn start_scan(&self) -> Result<()> {
        let runtime = runtime()?;
        let cancel_token = CancellationToken::new();
        let previous = self
            .scan_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel_token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        runtime.spawn(Self::scan_task(
            self.adapter.clone(),
            self.events.clone(),
            cancel_token,
        ));
        Ok(())
    }

    fn stop_scan(&self) {
        if let Some(token) = self
            .scan_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    fn connect(&self, peripheral: &PeripheralHandle) -> Result<Box<dyn GattConnection>> {
        let device = peripheral
            .raw
            .downcast_ref::<Device>()
            .cloned()
            .ok_or_else(|| BleError::Platform("peripheral was not discovered by bluest".into()))?;
        let runtime = runtime()?;

        let connection = BluestConnection {
            runtime: runtime.clone(),
            adapter: self.adapter.clone(),
            device: device.clone(),
            address: peripheral.address.clone(),
            events: self.events.clone(),
            characteristics: Arc::new(Mutex::new(HashMap::new())),
            notify_tokens: HashMap::new(),
            cancel_token: CancellationToken::new(),
            releases: self.releases.clone(),
        };

        let adapter = self.adapter.clone();
        let events = self.events.clone();
        let address = peripheral.address.clone();
        let cancel_token = connection.cancel_token.clone();
        runtime.spawn(async move {
            let result = if device.is_connected().await {
                Ok(())
            } else {
                tokio::select! {
                    result = adapter.connect_device(&device) => result,
                    _ = cancel_token.cancelled() => return,
                }
            };
            let (connected, status) = match result {
                Ok(()) => (true, GATT_SUCCESS),
                Err(e) => {
                    warn!("Connection to {} failed: {}", address, e);
                    (false, GATT_FAILURE)
                }
            };
            let _ = events.send(PlatformEvent::ConnectionStateChanged {
                address,
                connected,
                status,
            });
        });

        Ok(Box::new(connection))
    }

    async fn wait_released(&self) {
        self.releases.close();
        self.releases.wait().await;
        self.releases.reopen();
        debug!("All connection releases finished");
    }
}

struct BluestConnection {
    runtime: Handle,
    adapter: Adapter,
    device: Device,
    address: String,
    events: EventSender,
    characteristics: CharacteristicCache,
    notify_tokens: HashMap<CharacteristicRef, CancellationToken>,
    /// Parent of every task spawned for this connection
    cancel_token: CancellationToken,
    releases: TaskTracker,
}

impl BluestConnection {
    async fn discover(device: &Device, cache: &CharacteristicCache) -> bluest::Result<Vec<GattService>> {
        let mut services = Vec::new();
        for service in device.services().await? {
            let mut characteristics = Vec::new();
            for characteristic in service.characteristics().await? {
                let descriptors = match characteristic.descriptors().await {
                    Ok(descriptors) => descriptors.iter().map(|d| d.uuid()).collect(),
                    Err(e) => {
                        debug!("No descriptors for {}: {}", characteristic.uuid(), e);
                        Vec::new()
                    }
                };
                characteristics.push(GattCharacteristic {
                    uuid: characteristic.uuid(),
                    descriptors,
                });
                cache.lock().unwrap_or_else(PoisonError::into_inner).insert(
                    CharacteristicRef {
                        service: service.uuid(),
                        characteristic: characteristic.uuid(),
                    },
                    characteristic,
                );
            }
            services.push(GattService {
                uuid: service.uuid(),
                characteristics,
            });
        }
        Ok(services)
    }

    fn cached(&self, characteristic: CharacteristicRef) -> Option<Characteristic> {
        self.characteristics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&characteristic)
            .cloned()
    }

    /// Subscribes, which makes bluest write the CCCD, then forwards every value.
    async fn notify_task(
        characteristic: Characteristic,
        address: String,
        events: EventSender,
        cancel_token: CancellationToken,
    ) {
        info!("Listening for notifications on {}...", characteristic.uuid());
        let mut notification_stream = match characteristic.notify().await {
            Ok(stream) => {
                let _ = events.send(PlatformEvent::DescriptorWriteComplete {
                    address: address.clone(),
                    characteristic: characteristic.uuid(),
                    descriptor: UUID_CLIENT_CHARACTERISTIC_CONFIG,
                    status: GATT_SUCCESS,
                });
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = events.send(PlatformEvent::DescriptorWriteComplete {
                    address,
                    characteristic: characteristic.uuid(),
                    descriptor: UUID_CLIENT_CHARACTERISTIC_CONFIG,
                    status: GATT_FAILURE,
                });
                return;
            }
        };

        loop {
            tokio::select! {
                result = notification_stream.next() => {
                    match result {
                        Some(Ok(value)) => {
                            debug!("Received data: {:?}", value);
                            let _ = events.send(PlatformEvent::CharacteristicChanged {
                                address: address.clone(),
                                characteristic: characteristic.uuid(),
                                value,
                            });
                        }
                        Some(Err(e)) => {
                            error!("Error in notification stream: {}", e);
                            break;
                        }
                        None => break,
                    }
                }
                _ = cancel_token.cancelled() => return,
            }
        }

        // The stream only ends on its own when the link is gone.
        info!("Notification stream ended");
        let _ = events.send(PlatformEvent::ConnectionStateChanged {
            address,
            connected: false,
            status: GATT_FAILURE,
        });
    }
}

impl GattConnection for BluestConnection {
    fn discover_services(&mut self) -> Result<()> {
        let device = self.device.clone();
        let cache = self.characteristics.clone();
        let events = self.events.clone();
        let address = self.address.clone();
        let cancel_token = self.cancel_token.clone();

        self.runtime.spawn(async move {
            let discovered = tokio::select! {
                result = Self::discover(&device, &cache) => result,
                _ = cancel_token.cancelled() => return,
            };
            let event = match discovered {
                Ok(services) => PlatformEvent::ServicesDiscovered {
                    address,
                    status: GATT_SUCCESS,
                    services,
                },
                Err(e) => {
                    error!("Service discovery failed: {}", e);
                    PlatformEvent::ServicesDiscovered {
                        address,
                        status: GATT_FAILURE,
                        services: Vec::new(),
                    }
                }
            };
            let _ = events.send(event);
        });
        Ok(())
    }

    fn set_notify(&mut self, characteristic: CharacteristicRef, enabled: bool) -> Result<()> {
        if !enabled {
            if let Some(token) = self.notify_tokens.remove(&characteristic) {
                token.cancel();
            }
            return Ok(());
        }
        if self.notify_tokens.contains_key(&characteristic) {
            return Ok(());
        }

        let handle = self.cached(characteristic).ok_or_else(|| {
            BleError::Platform(format!("unknown characteristic {}", characteristic.characteristic))
        })?;
        let token = self.cancel_token.child_token();
        self.notify_tokens.insert(characteristic, token.clone());
        self.runtime.spawn(Self::notify_task(
            handle,
            self.address.clone(),
            self.events.clone(),
            token,
        ));
        Ok(())
    }

    fn write_descriptor(
        &mut self,
        characteristic: CharacteristicRef,
        descriptor: Uuid,
        _value: &[u8],
    ) -> Result<DescriptorWrite> {
        // bluest owns the CCCD; the notify task reports when it has been written.
        if descriptor == UUID_CLIENT_CHARACTERISTIC_CONFIG
            && self.notify_tokens.contains_key(&characteristic)
        {
            return Ok(DescriptorWrite::Pending);
        }
        Err(BleError::Platform(format!(
            "descriptor {} cannot be written directly",
            descriptor
        )))
    }

    fn write_characteristic(&mut self, characteristic: CharacteristicRef, value: &[u8]) -> bool {
        let Some(handle) = self.cached(characteristic) else {
            return false;
        };
        let value = value.to_vec();
        self.runtime.spawn(async move {
            if let Err(e) = handle.write(&value).await {
                error!("Write to {} failed: {}", handle.uuid(), e);
            }
        });
        true
    }

    fn close(self: Box<Self>) {
        self.cancel_token.cancel();
        let adapter = self.adapter.clone();
        let device = self.device.clone();
        let release = async move {
            if device.is_connected().await {
                info!("Disconnecting from device {}", device.id());
                if let Err(e) = adapter.disconnect_device(&device).await {
                    warn!("Disconnect failed: {}", e);
                }
            }
        };
        self.releases.spawn_on(release, &self.runtime);
    }
}

fn extract_mac_address(device_id_str: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").ok()?;
    re.find_iter(device_id_str)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::extract_mac_address;

    #[test]
    fn mac_address_from_device_id() {
        assert_eq!(
            extract_mac_address("BluetoothLE#BluetoothLE00:1a:7d:da:71:13-aa:bb:cc:dd:ee:ff"),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );
        assert_eq!(
            extract_mac_address("/org/bluez/hci0/dev_12-34-56-78-9A-BC"),
            Some("12-34-56-78-9A-BC".to_string())
        );
        assert_eq!(extract_mac_address("4F7C5E1A-0000-4000-8000-00805F9B34FB"), None);
    }
}
