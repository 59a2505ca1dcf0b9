use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DEFAULT_SCAN_WINDOW_MS;

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// How long one scan pass runs before it stops by itself
    pub window_ms: u64,
    /// Keep advertisements without a name. They cannot be told apart in a list.
    pub include_unnamed: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            window_ms: DEFAULT_SCAN_WINDOW_MS,
            include_unnamed: false,
        }
    }
}

impl ScanConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}
