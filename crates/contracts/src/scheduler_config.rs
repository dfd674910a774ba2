//! Scheduler configuration

use serde::{Deserialize, Serialize};

/// Default relative tolerance when deciding two render slots coincide
pub const DEFAULT_COINCIDENCE_TOLERANCE: f64 = 1e-9;

/// Runtime configuration of the tick scheduler
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Engine delta = schedule delta * time_scale. Latched per sequence.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Tick duration when no enabled sensor constrains timing
    #[serde(default)]
    pub idle_delta_time: f64,

    /// Relative tolerance used to decide that a sensor's render slot lands
    /// on the tick chosen by another sensor
    #[serde(default = "default_coincidence_tolerance")]
    pub coincidence_tolerance: f64,
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_coincidence_tolerance() -> f64 {
    DEFAULT_COINCIDENCE_TOLERANCE
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            time_scale: default_time_scale(),
            idle_delta_time: 0.0,
            coincidence_tolerance: default_coincidence_tolerance(),
        }
    }
}

impl SchedulerConfig {
    /// Whether slot times `a` and `b` denote the same instant
    pub fn coincides(&self, a: f64, b: f64) -> bool {
        if a == b {
            return true;
        }
        let scale = a.abs().max(b.abs()).max(1.0);
        (a - b).abs() <= self.coincidence_tolerance * scale
    }
}
