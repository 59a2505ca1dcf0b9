//! Error types for the BLE session core
//!
//! Every failure the core can detect is one variant of [`BleError`]. Synchronous
//! failures are returned from the call that detects them; discovery and scan
//! failures arrive through the event path and are published on the same channel
//! callers already watch for state transitions.

use thiserror::Error;

use crate::core::bluetooth::permission::Capability;

/// Errors reported by the scan controller, session and message transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("Permission not granted: {0:?}")]
    PermissionDenied(Capability),

    #[error("A scan is already running")]
    AlreadyScanning,

    #[error("A session is already active")]
    SessionAlreadyActive,

    #[error("Target service or characteristic not found on the peripheral")]
    ServiceNotFound,

    #[error("Service discovery failed with status {0}")]
    ServiceDiscoveryFailed(i32),

    #[error("Scan failed with error code {0}")]
    ScanFailed(i32),

    #[error("Session is not ready")]
    NotReady,

    #[error("Write rejected by the local radio stack")]
    WriteRejected,

    #[error("Enabling notifications failed with status {0}")]
    SubscribeFailed(i32),

    #[error("No async runtime available")]
    NoRuntime,

    #[error("Platform error: {0}")]
    Platform(String),
}

pub type Result<T> = std::result::Result<T, BleError>;
