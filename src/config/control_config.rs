use serde::{Deserialize, Serialize};

use crate::core::bluetooth::DEFAULT_OFFSET_STEPS;

/// Control screen settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Offsets the slider can select, low to high
    pub offset_steps: Vec<i32>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            offset_steps: DEFAULT_OFFSET_STEPS.to_vec(),
        }
    }
}
