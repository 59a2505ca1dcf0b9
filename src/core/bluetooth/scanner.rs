//! Time-bounded discovery
//! The scanner runs at most one scan pass at a time, feeds named peripherals into
//! the device registry and stops itself once the scan window elapses.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::device::DeviceRegistry;
use crate::core::bluetooth::permission::{Authorizer, Capability};
use crate::core::bluetooth::platform::BlePlatform;
use crate::core::bluetooth::types::{PeripheralHandle, RawPeripheral};
use crate::error::{BleError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a scan pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Timeout,
    Manual,
    Failed,
}

/// Progress of a scan pass, as seen by observers
#[derive(Debug, Clone)]
pub enum ScanEvent {
    Started,
    /// A peripheral was added to the registry
    DeviceFound(PeripheralHandle),
    Stopped(StopReason),
    Failed(BleError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Idle,
    Scanning,
}

struct ScanInner {
    state: ScanState,
    /// Bumped on every start so an old timeout cannot end a newer pass
    generation: u64,
    cancel_token: CancellationToken,
}

#[derive(Clone)]
pub struct BluetoothScanner {
    platform: Arc<dyn BlePlatform>,
    authorizer: Arc<dyn Authorizer>,
    devices: Arc<Mutex<DeviceRegistry>>,
    inner: Arc<Mutex<ScanInner>>,
    events: broadcast::Sender<ScanEvent>,
    include_unnamed: bool,
}

impl BluetoothScanner {
    pub fn new(
        platform: Arc<dyn BlePlatform>,
        authorizer: Arc<dyn Authorizer>,
        devices: Arc<Mutex<DeviceRegistry>>,
        include_unnamed: bool,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            platform,
            authorizer,
            devices,
            inner: Arc::new(Mutex::new(ScanInner {
                state: ScanState::Idle,
                generation: 0,
                cancel_token: CancellationToken::new(),
            })),
            events,
            include_unnamed,
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, ScanInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_devices(&self) -> MutexGuard<'_, DeviceRegistry> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    pub fn is_scanning(&self) -> bool {
        self.lock_inner().state == ScanState::Scanning
    }

    /// Snapshot of the registry in discovery order
    pub fn devices(&self) -> Vec<PeripheralHandle> {
        self.lock_devices().all().cloned().collect()
    }

    pub fn find_device(&self, address: &str) -> Option<PeripheralHandle> {
        self.lock_devices().get(address).cloned()
    }

    /// Starts a scan pass that ends by itself after `timeout`.
    pub fn start_scan(&self, timeout: Duration) -> Result<()> {
        let mut inner = self.lock_inner();
        if inner.state == ScanState::Scanning {
            return Err(BleError::AlreadyScanning);
        }
        if !self.authorizer.has_permission(Capability::Scan) {
            warn!("Scan permission not granted");
            return Err(BleError::PermissionDenied(Capability::Scan));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| BleError::NoRuntime)?;

        // Clear existing devices
        self.lock_devices().reset();
        self.platform.start_scan()?;

        inner.generation += 1;
        inner.cancel_token = CancellationToken::new();
        inner.state = ScanState::Scanning;

        let generation = inner.generation;
        let cancel_token = inner.cancel_token.clone();
        let scanner = self.clone();
        runtime.spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(timeout) => {
                    debug!("Scan window of {:?} elapsed", timeout);
                    scanner.finish(Some(generation), StopReason::Timeout);
                }
                _ = cancel_token.cancelled() => {}
            }
        });
        drop(inner);

        let _ = self.events.send(ScanEvent::Started);
        info!("Device scan started for {:?}.", timeout);
        Ok(())
    }

    /// Ends the current scan pass. A no-op when idle.
    pub fn stop_scan(&self) {
        if !self.finish(None, StopReason::Manual) {
            debug!("Stop requested while idle");
        }
    }

    fn finish(&self, generation: Option<u64>, reason: StopReason) -> bool {
        {
            let mut inner = self.lock_inner();
            if inner.state == ScanState::Idle {
                return false;
            }
            if generation.is_some_and(|g| g != inner.generation) {
                return false;
            }
            inner.state = ScanState::Idle;
            inner.cancel_token.cancel();
            // Under the lock so a concurrent start cannot land between state and radio
            self.platform.stop_scan();
        }

        let _ = self.events.send(ScanEvent::Stopped(reason));
        info!("Bluetooth scan stopped ({:?}).", reason);
        true
    }

    /// Feeds one advertisement into the registry. Returns whether it was added.
    pub fn handle_device_found(
        &self,
        address: String,
        name: Option<String>,
        rssi: Option<i16>,
        raw: RawPeripheral,
    ) -> bool {
        if !self.is_scanning() {
            debug!("Ignoring advertisement from {} outside a scan pass", address);
            return false;
        }

        let name = name.filter(|n| !n.trim().is_empty());
        if name.is_none() && !self.include_unnamed {
            return false;
        }

        let handle = PeripheralHandle::new(address, name, raw);
        if !self.lock_devices().add(handle.clone()) {
            return false;
        }

        info!(
            "Found device: Address: {}, Name: {}, RSSI: {:?}",
            handle.address,
            handle.display_name(),
            rssi
        );
        let _ = self.events.send(ScanEvent::DeviceFound(handle));
        true
    }

    /// Handles a failure reported by the radio. Non-zero codes end the pass.
    pub fn handle_scan_failed(&self, error_code: i32) -> Option<BleError> {
        if error_code == 0 {
            return None;
        }

        error!("Bluetooth scan failed with code {}", error_code);
        let err = BleError::ScanFailed(error_code);
        let _ = self.events.send(ScanEvent::Failed(err.clone()));
        self.finish(None, StopReason::Failed);
        Some(err)
    }
}
