pub mod config;
pub mod sim_params;
pub mod snapshot;
pub mod vecmath;

// Re-export key types for easier use by dependent crates
pub use config::{
    BackendPreference, BindingConfig, CellTypeConfig, ComponentConfig, ComputeConfig,
    DomainConfig, LigandConfig, OutputConfig, RangeConfig, ReceptorConfig, RegionConfig,
    SimulationConfig, TimingConfig, clamp_param, parse_hex_color, MIN_KD_UM,
};
pub use sim_params::RunParams;
pub use snapshot::Snapshot;
pub use vecmath::{angle_to_vec, vec_to_angle, Vec2};
