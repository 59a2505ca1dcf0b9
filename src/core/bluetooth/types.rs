//! Defines shared data structures for the Bluetooth module.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

/// Platform-specific peripheral object, opaque to the core.
#[derive(Clone)]
pub struct RawPeripheral(Arc<dyn Any + Send + Sync>);

impl RawPeripheral {
    pub fn new<T: Any + Send + Sync>(raw: T) -> Self {
        Self(Arc::new(raw))
    }

    /// Returns the platform object if it is of type `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for RawPeripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawPeripheral(..)")
    }
}

/// Represents a discovered Bluetooth peripheral
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    /// Stable address or platform identifier, unique within a registry
    pub address: String,
    /// The advertised name of the device, if available
    pub name: Option<String>,
    /// The platform handle used to connect
    pub raw: RawPeripheral,
}

impl PeripheralHandle {
    /// Creates a new PeripheralHandle instance
    pub fn new(address: impl Into<String>, name: Option<String>, raw: RawPeripheral) -> Self {
        Self {
            address: address.into(),
            name,
            raw,
        }
    }

    /// Name to show to a user
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

/// Lifecycle of a GATT session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    ServiceDiscovery,
    Subscribing,
    Ready,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        self != SessionState::Disconnected
    }
}

/// A payload pushed by the peripheral on a notify characteristic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The characteristic the notification arrived on
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(characteristic: Uuid, payload: Vec<u8>) -> Self {
        Self {
            characteristic,
            payload,
        }
    }

    /// Payload decoded as UTF-8, invalid sequences replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Points at one characteristic of a discovered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CharacteristicRef {
    pub service: Uuid,
    pub characteristic: Uuid,
}

/// A characteristic as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattCharacteristic {
    pub uuid: Uuid,
    pub descriptors: Vec<Uuid>,
}

/// A service as reported by service discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    pub uuid: Uuid,
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn characteristic(&self, uuid: Uuid) -> Option<CharacteristicRef> {
        self.characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .map(|c| CharacteristicRef {
                service: self.uuid,
                characteristic: c.uuid,
            })
    }
}

/// Everything the platform radio stack reports asynchronously
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    DeviceFound {
        address: String,
        name: Option<String>,
        rssi: Option<i16>,
        raw: RawPeripheral,
    },
    ScanFailed {
        error_code: i32,
    },
    ConnectionStateChanged {
        address: String,
        connected: bool,
        status: i32,
    },
    ServicesDiscovered {
        address: String,
        status: i32,
        services: Vec<GattService>,
    },
    DescriptorWriteComplete {
        address: String,
        characteristic: Uuid,
        descriptor: Uuid,
        status: i32,
    },
    CharacteristicChanged {
        address: String,
        characteristic: Uuid,
        value: Vec<u8>,
    },
}
