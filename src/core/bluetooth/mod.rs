//! Bluetooth functionality for the remote control
//! This module handles all bluetooth operations including scanning,
//! connecting, and exchanging messages with the peripheral.

mod bluest_platform;
mod commands;
mod constants;
mod device;
mod manager;
mod notification;
pub mod permission;
mod platform;
mod scanner;
mod session;
mod transport;
mod types;


// Re-export types that should be publicly accessible
pub use bluest_platform::BluestPlatform;
pub use commands::{CommandExecutor, CommandSender, ControlCommand, OffsetSelector};
pub use constants::*; // Re-export all constants
pub use device::DeviceRegistry;
pub use manager::{BluetoothManager, EventSender};
pub use notification::{NotificationHandler, SubscriptionId};
pub use permission::{AllowAll, Authorizer, Capability, GrantedCapabilities};
pub use platform::{BlePlatform, DescriptorWrite, GattConnection};
pub use scanner::{BluetoothScanner, ScanEvent, StopReason};
pub use session::{Session, SessionEvent};
pub use transport::MessageTransport;
pub use types::{
    CharacteristicRef, GattCharacteristic, GattService, InboundMessage, PeripheralHandle,
    PlatformEvent, RawPeripheral, SessionState,
};
