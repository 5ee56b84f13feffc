//! Pluggable behaviour: cell logic components and region rules, and the registry that builds
//! them from configuration by `kind` name.

pub mod logic;
pub mod rules;

use crate::cell::{Cell, CellId};
use crate::error::{SimError, SimResult};
use crate::field::Environment;
use crate::layout::Region;
use crate::model::{CellType, ModelIndex};
use crate::staging::Staging;
use chemotaxis_common::{ComponentConfig, Vec2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, read-only state handed to every callback of a tick phase.
///
/// Cells mutate only themselves; anything shared goes through the staging queues or the
/// environment's reaction accumulator, both safe to use from parallel callbacks.
pub struct TickContext<'a> {
    pub env: &'a Environment,
    pub cell_types: &'a [CellType],
    pub staging: &'a Staging,
    /// Simulated time at the start of the tick (min).
    pub time: f32,
    pub dt: f32,
    pub tick: u64,
    pub seed: u64,
}

impl TickContext<'_> {
    /// Deterministic RNG stream for one cell, tick and component slot.
    pub fn rng_for(&self, cell: CellId, salt: u64) -> StdRng {
        StdRng::seed_from_u64(mix_seed(&[self.seed, cell.0, self.tick, salt]))
    }
}

/// SplitMix64-style mixing of several words into one seed.
pub fn mix_seed(parts: &[u64]) -> u64 {
    parts.iter().fold(0x9E37_79B9_7F4A_7C15u64, |acc, &part| {
        let mut z = acc ^ part.wrapping_add(0x9E37_79B9_7F4A_7C15).wrapping_add(acc << 6);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    })
}

/// Behaviour attached to a cell type. One instance is shared by every cell of that type, so
/// per-cell state lives in the cell's extension slots (`slot` is this component's position in
/// the type's component list).
///
/// Early/Update/Late callbacks run in parallel over cells with no ordering between cells.
/// The `modify_*` hooks run in component-list order; each receives the unmodified base value
/// and the value left by the previous component.
pub trait CellLogic: Send + Sync {
    fn kind(&self) -> &str;

    /// Called once at startup, after the field grid exists.
    fn initialise(&self, _env: &Environment) -> SimResult<()> {
        Ok(())
    }

    fn early_update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn update(&self, cell: &mut Cell, slot: usize, ctx: &TickContext<'_>) -> SimResult<()>;

    fn late_update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn modify_weight(&self, _cell: &Cell, _receptor: usize, _base: f32, current: f32) -> f32 {
        current
    }

    fn modify_activity(&self, _cell: &Cell, _receptor: usize, _base: f32, current: f32) -> f32 {
        current
    }

    fn modify_difference(&self, _cell: &Cell, _receptor: usize, _base: Vec2, current: Vec2) -> Vec2 {
        current
    }

    fn modify_speed(&self, _cell: &Cell, _base: f32, current: f32) -> f32 {
        current
    }

    fn modify_color(&self, _cell: &Cell, _base: [u8; 3], current: [u8; 3]) -> [u8; 3] {
        current
    }
}

/// Mutable access granted to region rules at startup.
pub struct RegionSetup<'a> {
    pub env: &'a mut Environment,
    pub staging: &'a Staging,
    pub rng: &'a mut StdRng,
    pub cell_types: &'a [CellType],
}

/// Behaviour attached to every region of one layout colour.
pub trait RegionRule: Send + Sync {
    fn kind(&self) -> &str;

    /// Rules returning true get `tick` every tick, serially, before the Update fan-out.
    fn tick_active(&self) -> bool {
        false
    }

    fn init(&mut self, setup: &mut RegionSetup<'_>, region: &Region) -> SimResult<()>;

    fn tick(&self, _ctx: &TickContext<'_>, _region: &Region) -> SimResult<()> {
        Ok(())
    }
}

/// Names a factory can resolve: ligands, cell types and (for cell components) the receptors of
/// the owning cell type.
pub struct ComponentScope<'a> {
    pub model: &'a ModelIndex,
    pub cell_type: Option<usize>,
}

impl ComponentScope<'_> {
    pub fn ligand(&self, name: &str) -> SimResult<usize> {
        self.model.ligand(name)
    }

    pub fn cell_type(&self, name: &str) -> SimResult<usize> {
        self.model.cell_type(name)
    }

    /// Receptor of the cell type this component is attached to.
    pub fn receptor(&self, name: &str) -> SimResult<usize> {
        match self.cell_type {
            Some(cell_type) => self.model.receptor(cell_type, name),
            None => Err(SimError::Configuration(format!(
                "receptor '{}' referenced outside a cell type",
                name
            ))),
        }
    }
}

/// Typed view over a component's free-form TOML parameters.
pub struct Params<'a> {
    kind: &'a str,
    table: &'a toml::Table,
}

impl<'a> Params<'a> {
    pub fn new(kind: &'a str, table: &'a toml::Table) -> Self {
        Self { kind, table }
    }

    fn missing(&self, key: &str) -> SimError {
        SimError::Configuration(format!("component '{}' needs parameter '{}'", self.kind, key))
    }

    fn wrong_type(&self, key: &str, expected: &str) -> SimError {
        SimError::Configuration(format!("component '{}': '{}' must be {}", self.kind, key, expected))
    }

    pub fn opt_f32(&self, key: &str) -> SimResult<Option<f32>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::Float(v)) => Ok(Some(*v as f32)),
            Some(toml::Value::Integer(v)) => Ok(Some(*v as f32)),
            Some(_) => Err(self.wrong_type(key, "a number")),
        }
    }

    pub fn f32(&self, key: &str) -> SimResult<f32> {
        self.opt_f32(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn f32_or(&self, key: &str, default: f32) -> SimResult<f32> {
        Ok(self.opt_f32(key)?.unwrap_or(default))
    }

    pub fn opt_str(&self, key: &str) -> SimResult<Option<&'a str>> {
        match self.table.get(key) {
            None => Ok(None),
            Some(toml::Value::String(v)) => Ok(Some(v.as_str())),
            Some(_) => Err(self.wrong_type(key, "a string")),
        }
    }

    pub fn str(&self, key: &str) -> SimResult<&'a str> {
        self.opt_str(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn u32_or(&self, key: &str, default: u32) -> SimResult<u32> {
        match self.table.get(key) {
            None => Ok(default),
            Some(toml::Value::Integer(v)) if *v >= 0 => Ok((*v).min(u32::MAX as i64) as u32),
            Some(_) => Err(self.wrong_type(key, "a non-negative integer")),
        }
    }
}

pub type LogicFactory = fn(&Params<'_>, &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>>;
pub type RuleFactory = fn(&Params<'_>, &ComponentScope<'_>) -> SimResult<Box<dyn RegionRule>>;

/// Explicit registry of component kinds. Built-ins are registered by `with_builtins`;
/// embedding applications add their own with `register_logic` / `register_rule`.
#[derive(Clone, Default)]
pub struct Registry {
    logic: BTreeMap<String, LogicFactory>,
    rules: BTreeMap<String, RuleFactory>,
}

impl Registry {
    /// Registry with no kinds at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        logic::register_builtins(&mut registry);
        rules::register_builtins(&mut registry);
        registry
    }

    pub fn register_logic(&mut self, kind: &str, factory: LogicFactory) {
        if self.logic.insert(kind.to_string(), factory).is_some() {
            log::warn!("Cell logic kind '{}' registered twice; the later factory wins.", kind);
        }
    }

    pub fn register_rule(&mut self, kind: &str, factory: RuleFactory) {
        if self.rules.insert(kind.to_string(), factory).is_some() {
            log::warn!("Region rule kind '{}' registered twice; the later factory wins.", kind);
        }
    }

    pub fn logic_kinds(&self) -> impl Iterator<Item = &str> {
        self.logic.keys().map(String::as_str)
    }

    pub fn rule_kinds(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    pub fn build_logic(
        &self,
        config: &ComponentConfig,
        scope: &ComponentScope<'_>,
    ) -> SimResult<Arc<dyn CellLogic>> {
        let factory = self.logic.get(&config.kind).ok_or_else(|| {
            SimError::Configuration(format!("unknown cell component kind '{}'", config.kind))
        })?;
        factory(&Params::new(&config.kind, &config.params), scope)
    }

    pub fn build_rule(
        &self,
        config: &ComponentConfig,
        scope: &ComponentScope<'_>,
    ) -> SimResult<Box<dyn RegionRule>> {
        let factory = self.rules.get(&config.kind).ok_or_else(|| {
            SimError::Configuration(format!("unknown region rule kind '{}'", config.kind))
        })?;
        factory(&Params::new(&config.kind, &config.params), scope)
    }
}
