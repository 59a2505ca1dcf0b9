//! BLE remote control library
//! Scans for a single peripheral, drives its GATT session and exchanges small
//! text control messages with it, independent of any UI toolkit.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use error::{BleError, Result};
