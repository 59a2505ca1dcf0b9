//! GATT session state machine
//!
//! A [`Session`] drives one peripheral through
//! `Disconnected -> Connecting -> ServiceDiscovery -> Subscribing -> Ready`.
//! Transitions happen only in response to platform events, which the manager
//! feeds in one at a time; every transition runs under the session lock.
//!
//! Unlike a scan pass, a session waiting in `Connecting` has no timeout. It stays
//! there until the platform reports the link state or the caller disconnects.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::core::bluetooth::constants::{
    ENABLE_NOTIFICATION_VALUE, GATT_SUCCESS, ServiceDescriptor, UUID_CLIENT_CHARACTERISTIC_CONFIG,
};
use crate::core::bluetooth::permission::{Authorizer, Capability};
use crate::core::bluetooth::platform::{BlePlatform, DescriptorWrite, GattConnection};
use crate::core::bluetooth::types::{
    CharacteristicRef, GattService, PeripheralHandle, SessionState,
};
use crate::error::{BleError, Result};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// What observers of a session see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    Error(BleError),
}

/// The resources a ready session lends to the message transport
pub(crate) struct ReadyLink<'a> {
    pub connection: &'a mut (dyn GattConnection + 'static),
    pub write_characteristic: CharacteristicRef,
}

struct SessionInner {
    state: SessionState,
    peripheral: Option<PeripheralHandle>,
    connection: Option<Box<dyn GattConnection>>,
    write_characteristic: Option<CharacteristicRef>,
    notify_characteristic: Option<CharacteristicRef>,
    last_error: Option<BleError>,
}

pub struct Session {
    platform: Arc<dyn BlePlatform>,
    authorizer: Arc<dyn Authorizer>,
    descriptor: ServiceDescriptor,
    inner: Mutex<SessionInner>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(
        platform: Arc<dyn BlePlatform>,
        authorizer: Arc<dyn Authorizer>,
        descriptor: ServiceDescriptor,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            platform,
            authorizer,
            descriptor,
            inner: Mutex::new(SessionInner {
                state: SessionState::Disconnected,
                peripheral: None,
                connection: None,
                write_characteristic: None,
                notify_characteristic: None,
                last_error: None,
            }),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn last_error(&self) -> Option<BleError> {
        self.lock().last_error.clone()
    }

    /// The peripheral of the current or most recent attempt
    pub fn peripheral(&self) -> Option<PeripheralHandle> {
        self.lock().peripheral.clone()
    }

    pub fn descriptor(&self) -> ServiceDescriptor {
        self.descriptor
    }

    /// Requests a connection to `peripheral`. Only valid while disconnected.
    pub fn connect(&self, peripheral: PeripheralHandle) -> Result<()> {
        let mut inner = self.lock();
        if inner.state.is_active() {
            return Err(BleError::SessionAlreadyActive);
        }
        if !self.authorizer.has_permission(Capability::Connect) {
            warn!("Connect permission not granted");
            return Err(BleError::PermissionDenied(Capability::Connect));
        }

        info!(
            "Initiating connection to {} ({})...",
            peripheral.address,
            peripheral.display_name()
        );
        let connection = self.platform.connect(&peripheral)?;

        inner.connection = Some(connection);
        inner.peripheral = Some(peripheral);
        inner.write_characteristic = None;
        inner.notify_characteristic = None;
        inner.last_error = None;
        self.transition(&mut inner, SessionState::Connecting);
        Ok(())
    }

    /// Tears the session down from any state. Returns whether anything changed.
    pub fn disconnect(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_active() {
            debug!("Disconnect requested while already disconnected");
            return false;
        }

        info!("Disconnecting from device");
        Self::release(&mut inner);
        self.transition(&mut inner, SessionState::Disconnected);
        true
    }

    /// Same as [`Session::disconnect`]
    pub fn close(&self) -> bool {
        self.disconnect()
    }

    pub fn on_connection_state_changed(&self, address: &str, connected: bool, status: i32) {
        let mut inner = self.lock();
        if !Self::is_current(&inner, address) {
            debug!("Ignoring connection event for stale peripheral {}", address);
            return;
        }

        if !connected {
            if inner.state.is_active() {
                if status != GATT_SUCCESS {
                    warn!("Device {} disconnected with status {}", address, status);
                } else {
                    info!("Device {} disconnected", address);
                }
                Self::release(&mut inner);
                self.transition(&mut inner, SessionState::Disconnected);
            }
            return;
        }

        if inner.state != SessionState::Connecting {
            debug!("Ignoring connected event in state {:?}", inner.state);
            return;
        }

        info!("Connection successful, discovering services...");
        self.transition(&mut inner, SessionState::ServiceDiscovery);
        let requested = match inner.connection.as_deref_mut() {
            Some(connection) => connection.discover_services(),
            None => return,
        };
        if let Err(e) = requested {
            self.fail(&mut inner, e);
        }
    }

    pub fn on_services_discovered(&self, address: &str, status: i32, services: &[GattService]) {
        let mut inner = self.lock();
        if !Self::is_current(&inner, address) || inner.state != SessionState::ServiceDiscovery {
            debug!("Ignoring services-discovered event in state {:?}", inner.state);
            return;
        }

        if status != GATT_SUCCESS {
            self.fail(&mut inner, BleError::ServiceDiscoveryFailed(status));
            return;
        }

        let Some(service) = services.iter().find(|s| s.uuid == self.descriptor.service) else {
            for service in services {
                info!("Available service: {}", service.uuid);
            }
            error!("Control service not found: {}", self.descriptor.service);
            self.fail(&mut inner, BleError::ServiceNotFound);
            return;
        };
        info!("Found control service: {}", service.uuid);

        let notify = service.characteristic(self.descriptor.notify_characteristic);
        let write = service.characteristic(self.descriptor.write_characteristic);
        let (Some(notify), Some(write)) = (notify, write) else {
            error!(
                "Control characteristics missing (notify: {}, write: {})",
                notify.is_some(),
                write.is_some()
            );
            self.fail(&mut inner, BleError::ServiceNotFound);
            return;
        };

        inner.write_characteristic = Some(write);
        inner.notify_characteristic = Some(notify);

        let enabled = match inner.connection.as_deref_mut() {
            Some(connection) => connection.set_notify(notify, true),
            None => return,
        };
        if let Err(e) = enabled {
            self.fail(&mut inner, e);
            return;
        }

        info!("Subscribing to notifications...");
        self.transition(&mut inner, SessionState::Subscribing);
        let written = match inner.connection.as_deref_mut() {
            Some(connection) => connection.write_descriptor(
                notify,
                UUID_CLIENT_CHARACTERISTIC_CONFIG,
                &ENABLE_NOTIFICATION_VALUE,
            ),
            None => return,
        };
        match written {
            Ok(DescriptorWrite::Completed) => self.transition(&mut inner, SessionState::Ready),
            Ok(DescriptorWrite::Pending) => {}
            Err(e) => self.fail(&mut inner, e),
        }
    }

    pub fn on_descriptor_write_complete(
        &self,
        address: &str,
        characteristic: Uuid,
        descriptor: Uuid,
        status: i32,
    ) {
        let mut inner = self.lock();
        if !Self::is_current(&inner, address) || inner.state != SessionState::Subscribing {
            return;
        }
        let expected = inner
            .notify_characteristic
            .is_some_and(|c| c.characteristic == characteristic);
        if !expected || descriptor != UUID_CLIENT_CHARACTERISTIC_CONFIG {
            debug!("Ignoring write completion for descriptor {}", descriptor);
            return;
        }

        if status == GATT_SUCCESS {
            info!("Notifications enabled for {}", characteristic);
            self.transition(&mut inner, SessionState::Ready);
        } else {
            self.fail(&mut inner, BleError::SubscribeFailed(status));
        }
    }

    /// Whether a notification from `address` belongs to this session
    pub(crate) fn accepts_notification(&self, address: &str) -> bool {
        let inner = self.lock();
        matches!(inner.state, SessionState::Subscribing | SessionState::Ready)
            && Self::is_current(&inner, address)
    }

    /// Runs `f` against the resources of a ready session, under the session lock.
    pub(crate) fn with_ready_link<R>(
        &self,
        f: impl FnOnce(ReadyLink<'_>) -> Result<R>,
    ) -> Result<R> {
        let mut inner = self.lock();
        if inner.state != SessionState::Ready {
            return Err(BleError::NotReady);
        }
        let write_characteristic = inner.write_characteristic.ok_or(BleError::NotReady)?;
        let connection = inner.connection.as_deref_mut().ok_or(BleError::NotReady)?;
        f(ReadyLink {
            connection,
            write_characteristic,
        })
    }

    pub(crate) fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    fn is_current(inner: &SessionInner, address: &str) -> bool {
        inner
            .peripheral
            .as_ref()
            .is_some_and(|p| p.address == address)
    }

    fn release(inner: &mut SessionInner) {
        inner.write_characteristic = None;
        inner.notify_characteristic = None;
        if let Some(connection) = inner.connection.take() {
            connection.close();
            info!("Connection released");
        }
    }

    fn fail(&self, inner: &mut SessionInner, err: BleError) {
        error!("Session failed: {}", err);
        Self::release(inner);
        inner.last_error = Some(err.clone());
        self.transition(inner, SessionState::Disconnected);
        let _ = self.events.send(SessionEvent::Error(err));
    }

    fn transition(&self, inner: &mut SessionInner, next: SessionState) {
        if inner.state == next {
            return;
        }
        debug!("Session state {:?} -> {:?}", inner.state, next);
        inner.state = next;
        let _ = self.events.send(SessionEvent::StateChanged(next));
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        Self::release(inner);
    }
}
