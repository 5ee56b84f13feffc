//! Built-in cell logic components.

use super::{CellLogic, ComponentScope, Params, Registry, TickContext};
use crate::cell::Cell;
use crate::error::{SimError, SimResult};
use crate::events::LifecycleEvent;
use crate::field::{Environment, ReactionOrder};
use chemotaxis_common::{angle_to_vec, vec_to_angle};
use log::{debug, trace};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f32::consts::TAU;
use std::sync::Arc;

/// Attempts to find a free spot next to a dividing cell before giving up for this tick.
const MAX_PLACEMENT_ATTEMPTS: usize = 8;

pub fn register_builtins(registry: &mut Registry) {
    registry.register_logic("random_walk", RandomWalk::build);
    registry.register_logic("chemotaxis", Chemotaxis::build);
    registry.register_logic("secrete", Secrete::build);
    registry.register_logic("uptake", Uptake::build);
    registry.register_logic("divide", Divide::build);
    registry.register_logic("die", Die::build);
    registry.register_logic("differentiate", Differentiate::build);
    registry.register_logic("speed_modulation", SpeedModulation::build);
    registry.register_logic("activity_tint", ActivityTint::build);
}

/// Probability that a Poisson process with `rate` (per minute) fires within `dt` minutes.
fn event_probability(rate_per_min: f32, dt: f32) -> f32 {
    if rate_per_min <= 0.0 || dt <= 0.0 {
        0.0
    } else {
        1.0 - (-rate_per_min * dt).exp()
    }
}

fn check_ligand(kind: &str, env: &Environment, ligand: usize) -> SimResult<()> {
    if ligand < env.ligands().len() {
        Ok(())
    } else {
        Err(SimError::Initialization(format!(
            "component '{}' refers to ligand {} but the grid holds {}",
            kind,
            ligand,
            env.ligands().len()
        )))
    }
}

// --- Movement ---

/// Persistent random walk: the heading is redrawn at rate `1 / persistence_min`.
#[derive(Debug)]
pub struct RandomWalk {
    persistence_min: f32,
}

impl RandomWalk {
    fn build(params: &Params<'_>, _scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        let persistence_min = params.f32_or("persistence_min", 1.0)?.max(0.0);
        Ok(Arc::new(Self { persistence_min }))
    }
}

impl CellLogic for RandomWalk {
    fn kind(&self) -> &str {
        "random_walk"
    }

    fn update(&self, cell: &mut Cell, slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        let mut rng = ctx.rng_for(cell.id(), slot as u64);
        let turn = if self.persistence_min > 0.0 {
            event_probability(1.0 / self.persistence_min, ctx.dt)
        } else {
            1.0
        };
        if rng.random::<f32>() < turn {
            cell.heading = rng.random_range(0.0..TAU);
        }
        cell.velocity = angle_to_vec(cell.heading) * cell.speed();
        Ok(())
    }
}

/// Steers the heading along a receptor's sensed gradient, with optional angular noise.
#[derive(Debug)]
pub struct Chemotaxis {
    receptor: usize,
    strength: f32,
    noise: Option<Normal<f32>>,
}

impl Chemotaxis {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        let receptor = scope.receptor(params.str("receptor")?)?;
        let strength = params.f32_or("strength", 1.0)?;
        let noise_rad = params.f32_or("noise_rad", 0.0)?;
        let noise = if noise_rad > 0.0 {
            Some(Normal::new(0.0, noise_rad).map_err(|e| {
                SimError::Configuration(format!("chemotaxis: invalid noise_rad {}: {}", noise_rad, e))
            })?)
        } else {
            None
        };
        Ok(Arc::new(Self { receptor, strength, noise }))
    }
}

impl CellLogic for Chemotaxis {
    fn kind(&self) -> &str {
        "chemotaxis"
    }

    fn update(&self, cell: &mut Cell, slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        let state = *cell.receptor(self.receptor).ok_or_else(|| {
            SimError::fault(Some(cell.id().0), self.kind(), format!("no receptor {}", self.receptor))
        })?;

        let bias = state.difference.normalize_or_zero() * self.strength;
        let direction = angle_to_vec(cell.heading) + bias;
        if direction.length_squared() > 0.0 {
            cell.heading = vec_to_angle(direction);
        }
        if let Some(noise) = &self.noise {
            let mut rng = ctx.rng_for(cell.id(), slot as u64);
            cell.heading += noise.sample(&mut rng);
        }
        cell.velocity = angle_to_vec(cell.heading) * cell.speed();
        Ok(())
    }
}

// --- Ligand production and consumption ---

/// Zeroth-order production spread evenly over the footprint.
#[derive(Debug)]
pub struct Secrete {
    ligand: usize,
    rate_um_per_min: f32,
}

impl Secrete {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        Ok(Arc::new(Self {
            ligand: scope.ligand(params.str("ligand")?)?,
            rate_um_per_min: params.f32("rate_um_per_min")?.max(0.0),
        }))
    }
}

impl CellLogic for Secrete {
    fn kind(&self) -> &str {
        "secrete"
    }

    fn initialise(&self, env: &Environment) -> SimResult<()> {
        check_ligand(self.kind(), env, self.ligand)
    }

    fn update(&self, cell: &mut Cell, _slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        if self.rate_um_per_min == 0.0 {
            return Ok(());
        }
        let footprint = cell.footprint();
        if footprint.is_empty() {
            if let Some(idx) = ctx.env.geometry().nearest_point(cell.position) {
                ctx.env.push_reaction_index(idx, self.rate_um_per_min, ReactionOrder::Zeroth, self.ligand, self.ligand);
            }
            return Ok(());
        }
        let share = self.rate_um_per_min / footprint.len() as f32;
        for &idx in footprint {
            ctx.env.push_reaction_index(idx, share, ReactionOrder::Zeroth, self.ligand, self.ligand);
        }
        Ok(())
    }
}

/// Consumes a ligand at the cell centre, optionally converting it into another.
#[derive(Debug)]
pub struct Uptake {
    input: usize,
    output: Option<usize>,
    rate0: f32,
    rate1: f32,
    io_ratio: f32,
}

impl Uptake {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        let output = match params.opt_str("output")? {
            Some(name) => Some(scope.ligand(name)?),
            None => None,
        };
        Ok(Arc::new(Self {
            input: scope.ligand(params.str("ligand")?)?,
            output,
            rate0: params.f32_or("rate0", 0.0)?,
            rate1: params.f32_or("rate1", 0.0)?,
            io_ratio: params.f32_or("io_ratio", 1.0)?.max(0.0),
        }))
    }
}

impl CellLogic for Uptake {
    fn kind(&self) -> &str {
        "uptake"
    }

    fn initialise(&self, env: &Environment) -> SimResult<()> {
        check_ligand(self.kind(), env, self.input)?;
        match self.output {
            Some(output) => check_ligand(self.kind(), env, output),
            None => Ok(()),
        }
    }

    fn update(&self, cell: &mut Cell, _slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        ctx.env
            .degrade_at_rate(self.input, self.output, cell.position, self.rate0, self.rate1, self.io_ratio, ctx.dt);
        Ok(())
    }
}

// --- Lifecycle ---

#[derive(Debug, Clone, Copy)]
struct DivisionState {
    last_division: f32,
}

/// Mitosis at `rate_per_hr`, at most once per `refractory_min`.
#[derive(Debug)]
pub struct Divide {
    rate_per_min: f32,
    refractory_min: f32,
}

impl Divide {
    fn build(params: &Params<'_>, _scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        Ok(Arc::new(Self {
            rate_per_min: params.f32("rate_per_hr")?.max(0.0) / 60.0,
            refractory_min: params.f32_or("refractory_min", 0.0)?.max(0.0),
        }))
    }
}

impl CellLogic for Divide {
    fn kind(&self) -> &str {
        "divide"
    }

    fn update(&self, cell: &mut Cell, slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        let birth = cell.birth_time();
        let last = cell.extension.get_or_insert_with(slot, || DivisionState { last_division: birth }).last_division;
        if ctx.time - last < self.refractory_min {
            return Ok(());
        }

        let mut rng = ctx.rng_for(cell.id(), slot as u64);
        if rng.random::<f32>() >= event_probability(self.rate_per_min, ctx.dt) {
            return Ok(());
        }

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let offset = angle_to_vec(rng.random_range(0.0..TAU)) * cell.radius().max(ctx.env.geometry().dx);
            let candidate = cell.position + offset;
            if ctx.env.can_enter(candidate) {
                ctx.staging
                    .add_cell(Some(cell.id()), cell.cell_type(), candidate, LifecycleEvent::Mitotic);
                trace!("Cell {} divided.", cell.id().0);
                if let Some(state) = cell.extension.get_mut::<DivisionState>(slot) {
                    state.last_division = ctx.time;
                }
                return Ok(());
            }
        }
        debug!("Cell {} found no room to divide.", cell.id().0);
        Ok(())
    }
}

/// Random death at `rate_per_hr`.
#[derive(Debug)]
pub struct Die {
    rate_per_min: f32,
    event: LifecycleEvent,
}

impl Die {
    fn build(params: &Params<'_>, _scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        let event = match params.opt_str("mode")?.unwrap_or("apoptotic") {
            "apoptotic" => LifecycleEvent::Apoptotic,
            "necrotic" => LifecycleEvent::Necrotic,
            other => {
                return Err(SimError::Configuration(format!(
                    "die: mode must be 'apoptotic' or 'necrotic', got '{}'",
                    other
                )))
            }
        };
        Ok(Arc::new(Self { rate_per_min: params.f32("rate_per_hr")?.max(0.0) / 60.0, event }))
    }
}

impl CellLogic for Die {
    fn kind(&self) -> &str {
        "die"
    }

    fn update(&self, cell: &mut Cell, slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        let mut rng = ctx.rng_for(cell.id(), slot as u64);
        if rng.random::<f32>() < event_probability(self.rate_per_min, ctx.dt) {
            ctx.staging.remove_cell(cell.id(), self.event);
        }
        Ok(())
    }
}

/// Turns the cell into another type once a receptor's activity reaches `threshold`.
#[derive(Debug)]
pub struct Differentiate {
    receptor: usize,
    threshold: f32,
    into: usize,
}

impl Differentiate {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        Ok(Arc::new(Self {
            receptor: scope.receptor(params.str("receptor")?)?,
            threshold: params.f32("threshold")?,
            into: scope.cell_type(params.str("into")?)?,
        }))
    }
}

impl CellLogic for Differentiate {
    fn kind(&self) -> &str {
        "differentiate"
    }

    fn update(&self, cell: &mut Cell, _slot: usize, ctx: &TickContext<'_>) -> SimResult<()> {
        let activity = cell.receptor(self.receptor).map_or(0.0, |r| r.activity);
        if activity >= self.threshold && self.into != cell.cell_type() {
            ctx.staging
                .replace_cell(cell.id(), self.into, cell.position, LifecycleEvent::Differentiated);
        }
        Ok(())
    }
}

// --- Value modifiers ---

/// Scales speed by `1 + gain * activity`.
#[derive(Debug)]
pub struct SpeedModulation {
    receptor: usize,
    gain: f32,
}

impl SpeedModulation {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        Ok(Arc::new(Self {
            receptor: scope.receptor(params.str("receptor")?)?,
            gain: params.f32("gain")?,
        }))
    }
}

impl CellLogic for SpeedModulation {
    fn kind(&self) -> &str {
        "speed_modulation"
    }

    fn update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn modify_speed(&self, cell: &Cell, _base: f32, current: f32) -> f32 {
        let activity = cell.receptor(self.receptor).map_or(0.0, |r| r.activity);
        (current * (1.0 + self.gain * activity)).max(0.0)
    }
}

/// Blends the draw colour towards `tint` by receptor activity.
#[derive(Debug)]
pub struct ActivityTint {
    receptor: usize,
    tint: [u8; 3],
}

impl ActivityTint {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Arc<dyn CellLogic>> {
        let tint = match params.opt_str("tint")? {
            Some(hex) => chemotaxis_common::parse_hex_color(hex)
                .map_err(|e| SimError::Configuration(format!("activity_tint: {}", e)))?,
            None => [230, 60, 40],
        };
        Ok(Arc::new(Self { receptor: scope.receptor(params.str("receptor")?)?, tint }))
    }
}

impl CellLogic for ActivityTint {
    fn kind(&self) -> &str {
        "activity_tint"
    }

    fn update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
        Ok(())
    }

    fn modify_color(&self, cell: &Cell, _base: [u8; 3], current: [u8; 3]) -> [u8; 3] {
        let t = cell.receptor(self.receptor).map_or(0.0, |r| r.activity).clamp(0.0, 1.0);
        let mut blended = current;
        for (channel, target) in blended.iter_mut().zip(self.tint) {
            *channel = (*channel as f32 + (target as f32 - *channel as f32) * t).round() as u8;
        }
        blended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellId;
    use crate::field::Ligand;
    use crate::model::{CellType, ModelIndex};
    use crate::staging::Staging;
    use chemotaxis_common::{RangeConfig, SimulationConfig, Vec2};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn model() -> ModelIndex {
        let config = SimulationConfig::from_toml_str(
            r##"
            [domain]
            dx_um = 2.0
            [timing]
            physics_dt_min = 0.1
            total_time_min = 1.0
            record_interval_min = 1.0
            [[ligands]]
            name = "a"
            diffusivity_um2_per_min = 0.0
            [[ligands]]
            name = "b"
            diffusivity_um2_per_min = 0.0
            [[cell_types]]
            name = "amoeba"
            speed_um_per_min = { min = 3.0, max = 3.0 }
            radius_um = { min = 4.0, max = 4.0 }
            [[cell_types.receptors]]
            name = "r"
            bindings = [{ ligand = "a", kd_um = 1.0 }]
            [[cell_types]]
            name = "spore"
            speed_um_per_min = { min = 0.0, max = 0.0 }
            radius_um = { min = 3.0, max = 3.0 }
            "##,
        )
        .expect("config");
        ModelIndex::from_config(&config)
    }

    fn build(kind: &str, params: &str) -> Arc<dyn CellLogic> {
        let table: toml::Table = params.parse().expect("params");
        let index = model();
        let scope = ComponentScope { model: &index, cell_type: Some(0) };
        let config = chemotaxis_common::ComponentConfig { kind: kind.to_string(), params: table };
        Registry::with_builtins().build_logic(&config, &scope).expect("component")
    }

    fn env() -> Environment {
        Environment::open(
            20,
            20,
            2.0,
            vec![Ligand { name: "a".into(), diffusivity: 0.0 }, Ligand { name: "b".into(), diffusivity: 0.0 }],
        )
        .unwrap()
    }

    fn cell_type() -> CellType {
        CellType::bare(0, "amoeba", RangeConfig::fixed(3.0), RangeConfig::fixed(4.0))
    }

    fn ctx<'a>(env: &'a Environment, types: &'a [CellType], staging: &'a Staging, time: f32) -> TickContext<'a> {
        TickContext { env, cell_types: types, staging, time, dt: 0.1, tick: 0, seed: 42 }
    }

    #[test]
    fn random_walk_moves_at_cell_speed() {
        let env = env();
        let types = vec![cell_type()];
        let staging = Staging::default();
        let walk = build("random_walk", "persistence_min = 2.0");
        let mut cell = Cell::new(CellId(1), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut StdRng::seed_from_u64(0));
        walk.update(&mut cell, 0, &ctx(&env, &types, &staging, 0.0)).unwrap();
        assert!((cell.velocity.length() - 3.0).abs() < 1e-4);
    }

    #[test]
    fn secretion_is_spread_over_the_footprint() {
        let env = env();
        let types = vec![cell_type()];
        let staging = Staging::default();
        let secrete = build("secrete", "ligand = \"b\"\nrate_um_per_min = 6.0");
        let mut cell = Cell::new(CellId(1), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut StdRng::seed_from_u64(0));
        cell.update_local_footprint(&env);
        secrete.update(&mut cell, 0, &ctx(&env, &types, &staging, 0.0)).unwrap();
        let total: f32 = cell
            .footprint()
            .iter()
            .map(|&idx| env.pending_reaction(idx, ReactionOrder::Zeroth, 1, 1))
            .sum();
        assert!((total - 6.0).abs() < 1e-4);
    }

    #[test]
    fn die_always_fires_at_huge_rates() {
        let env = env();
        let types = vec![cell_type()];
        let staging = Staging::default();
        let die = build("die", "rate_per_hr = 1e9\nmode = \"necrotic\"");
        let mut cell = Cell::new(CellId(5), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut StdRng::seed_from_u64(0));
        die.update(&mut cell, 0, &ctx(&env, &types, &staging, 0.0)).unwrap();
        let removals = staging.take_removals();
        assert_eq!(removals.len(), 1);
        assert_eq!(removals[0].event, LifecycleEvent::Necrotic);
    }

    #[test]
    fn divide_respects_refractory_period() {
        let env = env();
        let types = vec![cell_type()];
        let staging = Staging::default();
        let divide = build("divide", "rate_per_hr = 1e9\nrefractory_min = 5.0");
        let mut cell = Cell::new(CellId(1), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut StdRng::seed_from_u64(0));
        divide.update(&mut cell, 0, &ctx(&env, &types, &staging, 1.0)).unwrap();
        assert_eq!(staging.pending_creations(), 0);
        divide.update(&mut cell, 0, &ctx(&env, &types, &staging, 6.0)).unwrap();
        assert_eq!(staging.pending_creations(), 1);
        divide.update(&mut cell, 0, &ctx(&env, &types, &staging, 7.0)).unwrap();
        assert_eq!(staging.pending_creations(), 1);
        let daughter = &staging.take_creations()[0];
        assert_eq!(daughter.event, LifecycleEvent::Mitotic);
        assert_eq!(daughter.origin, Some(CellId(1)));
        assert!(env.can_enter(daughter.position));
    }

    #[test]
    fn differentiation_replaces_active_cells() {
        let mut env = env();
        env.fill_concentration(0, 9.0);
        let mut amoeba = cell_type();
        amoeba.receptors.push(crate::model::Receptor {
            name: "r".into(),
            weight: 1.0,
            bindings: vec![crate::kinetics::Binding { ligand: 0, kd: 1.0, efficacy: 1.0 }],
        });
        let types = vec![amoeba];
        let staging = Staging::default();
        let differentiate = build("differentiate", "receptor = \"r\"\nthreshold = 0.8\ninto = \"spore\"");
        let mut cell = Cell::new(CellId(3), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut StdRng::seed_from_u64(0));
        cell.update_local_footprint(&env);
        cell.update_receptor_state(&env, &types[0]);
        differentiate.update(&mut cell, 0, &ctx(&env, &types, &staging, 0.0)).unwrap();
        let creations = staging.take_creations();
        assert_eq!(creations[0].cell_type, 1);
        assert_eq!(creations[0].replaces, Some(CellId(3)));
    }

    #[test]
    fn bad_die_mode_is_rejected() {
        let table: toml::Table = "rate_per_hr = 1.0\nmode = \"sideways\"".parse().unwrap();
        let index = model();
        let scope = ComponentScope { model: &index, cell_type: Some(0) };
        let config = chemotaxis_common::ComponentConfig { kind: "die".into(), params: table };
        assert!(Registry::with_builtins().build_logic(&config, &scope).is_err());
    }
}
