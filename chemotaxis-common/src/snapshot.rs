use serde::{Deserialize, Serialize};

/// A snapshot of the simulation state at a specific time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The simulation time (in minutes) at which the snapshot was taken.
    pub time: f32,
    /// Number of live cells.
    pub cell_count: u32,
    /// Mean concentration (uM) of each ligand over the open grid points, in ligand order.
    pub mean_concentrations: Vec<f32>,
    /// Optional: raw [x, y] positions (um) of all live cells.
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "positions": null
    pub positions: Option<Vec<(f32, f32)>>,
}
