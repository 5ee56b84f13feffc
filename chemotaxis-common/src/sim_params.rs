use serde::{Deserialize, Serialize};

/// Run parameters derived from the configuration, used frequently during simulation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// Physics timestep (min).
    pub dt: f32,
    /// Grid spacing (um).
    pub dx: f32,
    pub total_steps: u64,
    /// Steps between recorded snapshots.
    pub record_interval_steps: u64,
    /// Steps between write-to-file notifications (0 disables them).
    pub output_period_steps: u64,
    /// Minimum wall-clock gap between redraw notifications.
    pub redraw_interval_ms: u64,
    pub seed: u64,
}

impl RunParams {
    /// Converts a duration in simulated minutes into a whole number of steps (at least one).
    pub fn steps_for(&self, minutes: f32) -> u64 {
        if self.dt <= 0.0 {
            return 1;
        }
        (minutes / self.dt).round().max(1.0) as u64
    }
}
