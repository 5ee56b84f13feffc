//! Chemotactic cell simulation engine: ligand fields on a uniform grid with leapfrog
//! diffusion and point reactions, receptor-bearing cell agents, and a tick orchestrator.

pub mod cell;
pub mod components;
pub mod error;
pub mod events;
pub mod field;
pub mod grid;
pub mod kinetics;
pub mod layout;
pub mod model;
pub mod output;
pub mod runner;
pub mod simulation;
pub mod staging;

pub use cell::{Cell, CellId, ReceptorState};
pub use components::{CellLogic, RegionRule, Registry, TickContext};
pub use error::{SimError, SimResult};
pub use events::{CellNotice, Frame, LifecycleEvent, PositionRecord, SimulationObserver};
pub use field::{Environment, Ligand, PointFlags, ReactionOrder};
pub use layout::{Layout, Region};
pub use runner::{RunControl, RunHandle, SimulationRunner};
pub use simulation::{RunState, Simulation, SimulationBuilder};
