//! Seams to the platform radio stack
//!
//! Every request here is fire-and-forget: it returns as soon as the local stack
//! accepted or rejected it, and the outcome arrives later as a
//! [`PlatformEvent`](crate::core::bluetooth::types::PlatformEvent) on the
//! manager's event queue.

use uuid::Uuid;

use crate::core::bluetooth::types::{CharacteristicRef, PeripheralHandle};
use crate::error::Result;

/// Adapter-level operations
#[async_trait::async_trait]
pub trait BlePlatform: Send + Sync {
    /// Begins delivering `DeviceFound` events
    fn start_scan(&self) -> Result<()>;

    /// Stops delivering `DeviceFound` events. Safe to call when not scanning.
    fn stop_scan(&self);

    /// Requests a GATT connection. The returned handle is owned by the caller and
    /// must be closed by it.
    fn connect(&self, peripheral: &PeripheralHandle) -> Result<Box<dyn GattConnection>>;

    /// Resolves once every connection closed so far has been torn down.
    async fn wait_released(&self) {}
}

/// How the platform finished a descriptor write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    /// Completion will be reported by a `DescriptorWriteComplete` event
    Pending,
    /// The write already took effect
    Completed,
}

/// Operations on one open GATT connection
pub trait GattConnection: Send {
    /// Requests service enumeration, answered by `ServicesDiscovered`
    fn discover_services(&mut self) -> Result<()>;

    /// Enables or disables local delivery of notifications for a characteristic
    fn set_notify(&mut self, characteristic: CharacteristicRef, enabled: bool) -> Result<()>;

    fn write_descriptor(
        &mut self,
        characteristic: CharacteristicRef,
        descriptor: Uuid,
        value: &[u8],
    ) -> Result<DescriptorWrite>;

    /// Queues a characteristic write. Returns whether the local stack accepted it.
    fn write_characteristic(&mut self, characteristic: CharacteristicRef, value: &[u8]) -> bool;

    /// Releases the connection. Teardown may finish after this returns; see
    /// [`BlePlatform::wait_released`].
    fn close(self: Box<Self>);
}
