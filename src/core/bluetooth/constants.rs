//! Constants used throughout the application
//! This module contains the GATT layout the peripheral firmware exposes and the
//! timing defaults of the scan controller.

use uuid::Uuid;

/// The UUID of the remote control service
pub const UUID_CONTROL_SERVICE: Uuid = Uuid::from_u128(0xab0828b1_198e_4351_b779_901fa0e0371e);

/// The UUID of the characteristic the client writes to ("RX" on the peripheral side)
pub const UUID_CONTROL_WRITE_CHAR: Uuid = Uuid::from_u128(0x4ac8a682_9736_4e5d_932b_e9b31405049c);

/// The UUID of the notify-only characteristic ("TX" on the peripheral side)
pub const UUID_CONTROL_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x84d4f420_e7f0_4b0c_b16a_a125b0521aed);

/// Standard Client Characteristic Configuration descriptor
pub const UUID_CLIENT_CHARACTERISTIC_CONFIG: Uuid =
    Uuid::from_u128(0x00002902_0000_1000_8000_00805f9b34fb);

/// CCCD value that turns on server-side notifications
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Status code the platform reports for a successful GATT operation
pub const GATT_SUCCESS: i32 = 0;

/// Scan duration in milliseconds
pub const DEFAULT_SCAN_WINDOW_MS: u64 = 2000;

/// Slider positions offered by the control screen
pub const DEFAULT_OFFSET_STEPS: [i32; 5] = [-30, -15, 0, 15, 30];

/// The service and characteristic triple this application talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service: Uuid,
    pub write_characteristic: Uuid,
    pub notify_characteristic: Uuid,
}

/// The fixed layout the peripheral firmware exposes.
pub const CONTROL_SERVICE: ServiceDescriptor = ServiceDescriptor {
    service: UUID_CONTROL_SERVICE,
    write_characteristic: UUID_CONTROL_WRITE_CHAR,
    notify_characteristic: UUID_CONTROL_NOTIFY_CHAR,
};
