use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Cadences and thresholds for the sampling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Pointer position and foreground window poll
    pub position_interval_ms: u64,
    pub screenshot_interval_ms: u64,
    pub clipboard_interval_ms: u64,

    /// Delay before re-checking the pointer after a movement
    pub dwell_delay_ms: u64,

    /// Displacement (Euclidean) beyond which the pointer counts as moved
    pub movement_threshold_px: f64,

    /// Per-axis distance under which the pointer counts as settled
    pub dwell_tolerance_px: i32,

    /// Clipboard payloads at or above this many characters are ignored
    pub clipboard_max_chars: usize,
    pub description_max_chars: usize,

    /// Upper bound for a single probe call
    pub probe_timeout_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            position_interval_ms: 500,
            screenshot_interval_ms: 3000,
            clipboard_interval_ms: 1000,
            dwell_delay_ms: 800,
            movement_threshold_px: 10.0,
            dwell_tolerance_px: 5,
            clipboard_max_chars: 1000,
            description_max_chars: 50,
            probe_timeout_ms: 2000,
        }
    }
}

impl SamplingConfig {
    pub fn position_interval(&self) -> Duration {
        Duration::from_millis(self.position_interval_ms.max(1))
    }

    pub fn screenshot_interval(&self) -> Duration {
        Duration::from_millis(self.screenshot_interval_ms.max(1))
    }

    pub fn clipboard_interval(&self) -> Duration {
        Duration::from_millis(self.clipboard_interval_ms.max(1))
    }

    pub fn dwell_delay(&self) -> Duration {
        Duration::from_millis(self.dwell_delay_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}
