//! Core functionality for the remote control
//! This module contains the BLE session core, independent of any presentation layer

pub mod bluetooth;

// Re-export commonly used types
pub use bluetooth::{BluetoothManager, BluestPlatform};
