use crate::cell::{Cell, CellId};
use crate::components::{mix_seed, RegionRule, RegionSetup, Registry, ComponentScope, TickContext, CellLogic};
use crate::error::{SimError, SimResult};
use crate::events::{CellNotice, Frame, LifecycleEvent, Observers, PositionRecord, SimulationObserver, Sprite};
use crate::field::{select_backend, BackendProvider, Environment, Ligand};
use crate::layout::{Layout, Region};
use crate::model::{build_cell_types, CellType, ModelIndex};
use crate::output::PositionLog;
use crate::runner::RunControl;
use crate::staging::Staging;
use chemotaxis_common::{clamp_param, RangeConfig, RunParams, SimulationConfig, Snapshot, Vec2};
use log::{debug, error, info, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Salt for the RNG stream that samples a new cell's radius and speed.
const SPAWN_SALT: u64 = 0x5EED;
/// Poll period of the paused state.
const PAUSE_POLL: Duration = Duration::from_millis(5);

/// Lifecycle of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Initialising,
    Running,
    Paused,
    Cancelled,
    Closed,
    /// A callback failed; the run stopped at the tick it happened in.
    Faulted,
}

/// Collects everything a run needs before Initialising.
pub struct SimulationBuilder {
    config: SimulationConfig,
    registry: Registry,
    observers: Observers,
    providers: Vec<Box<dyn BackendProvider>>,
    layout: Option<Layout>,
    extra_components: Vec<(String, Arc<dyn CellLogic>)>,
}

impl SimulationBuilder {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            registry: Registry::with_builtins(),
            observers: Observers::new(),
            providers: Vec::new(),
            layout: None,
            extra_components: Vec::new(),
        }
    }

    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn observer(mut self, observer: Box<dyn SimulationObserver>) -> Self {
        self.observers.subscribe(observer);
        self
    }

    /// Accelerator provider probed ahead of the CPU backends.
    pub fn backend_provider(mut self, provider: Box<dyn BackendProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Uses an already parsed layout instead of `domain.layout_image` / `width` x `height`.
    pub fn layout(mut self, layout: Layout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Appends a component instance to a cell type, after the configured ones.
    pub fn component(mut self, cell_type: &str, component: Arc<dyn CellLogic>) -> Self {
        self.extra_components.push((cell_type.to_string(), component));
        self
    }

    /// Runs Initialising: layout, field grid, components, region rules and seeding.
    pub fn build(self) -> SimResult<Simulation> {
        let SimulationBuilder { config, registry, mut observers, providers, layout, extra_components } = self;
        info!("Simulation state: {:?} -> {:?}", RunState::Uninitialized, RunState::Initialising);
        let params = config.get_run_params();

        // --- Layout and field grid ---
        let layout = match layout {
            Some(layout) => layout,
            None => match &config.domain.layout_image {
                Some(path) => Layout::from_image_path(path)?,
                None => Layout::open(config.domain.width as usize, config.domain.height as usize),
            },
        };
        let backend = select_backend(config.compute.backend, &providers)?;
        let ligands = config
            .ligands
            .iter()
            .map(|l| Ligand { name: l.name.clone(), diffusivity: l.diffusivity_um2_per_min })
            .collect();
        let mut env = Environment::new(layout, params.dx, ligands, backend)?;
        for (idx, ligand) in config.ligands.iter().enumerate() {
            if ligand.initial_concentration_um > 0.0 {
                env.fill_concentration(idx, ligand.initial_concentration_um);
            }
        }
        info!(
            "Field grid {}x{} (dx = {} um), {} ligands, backend '{}'.",
            env.geometry().width,
            env.geometry().height,
            params.dx,
            env.ligands().len(),
            env.backend_name()
        );

        // --- Model ---
        let index = ModelIndex::from_config(&config);
        let mut cell_types = build_cell_types(&config, &index, &registry)?;
        for (type_name, component) in extra_components {
            let type_index = index.cell_type(&type_name)?;
            cell_types[type_index].components.push(component);
        }
        for cell_type in &cell_types {
            for component in &cell_type.components {
                component.initialise(&env)?;
            }
        }

        // --- Regions ---
        let mut rng = StdRng::seed_from_u64(params.seed);
        let staging = Staging::new(1);
        let regions: Vec<Region> = env.regions().to_vec();
        let mut region_rules: Vec<(Region, Box<dyn RegionRule>)> = Vec::new();
        let scope = ComponentScope { model: &index, cell_type: None };
        for region_config in &config.regions {
            let color = region_config
                .rgb()
                .map_err(|e| SimError::Configuration(e.to_string()))?;
            let matching: Vec<&Region> = regions.iter().filter(|r| r.color == color).collect();
            if matching.is_empty() {
                warn!("No layout region has colour {}; its rules are unused.", region_config.color);
            }
            for region in matching {
                for rule_config in &region_config.rules {
                    let mut rule = registry.build_rule(rule_config, &scope)?;
                    let mut setup = RegionSetup {
                        env: &mut env,
                        staging: &staging,
                        rng: &mut rng,
                        cell_types: &cell_types,
                    };
                    rule.init(&mut setup, region)?;
                    debug!("Rule '{}' attached to region {} ({} points).", rule.kind(), region.id, region.len());
                    region_rules.push((region.clone(), rule));
                }
            }
        }

        // --- Outputs ---
        if config.output.position_log {
            let path = format!("{}_position_log.csv", config.output.base_filename);
            match PositionLog::create(&path) {
                Ok(log) => observers.subscribe(Box::new(log)),
                Err(e) => error!("{}; position log disabled.", e),
            }
        }

        let mut sim = Simulation {
            redraw_interval: Duration::from_millis(params.redraw_interval_ms),
            config,
            params,
            env,
            cell_types,
            region_rules,
            cells: Vec::new(),
            staging,
            observers,
            rng,
            state: RunState::Initialising,
            time: 0.0,
            tick: 0,
            last_redraw: None,
            recorded_snapshots: Vec::new(),
            cancelled: false,
            closed: false,
        };

        // Seeded cells are live before the first tick.
        sim.merge_creations(&HashMap::new())?;
        sim.record_snapshot();
        sim.set_state(RunState::Running);
        info!(
            "Initialised {} cells of {} types; {} region rules.",
            sim.cells.len(),
            sim.cell_types.len(),
            sim.region_rules.len()
        );
        Ok(sim)
    }
}

/// A simulation run: field grid, live cells and the tick loop. Owned by the caller (or the
/// runner thread); there is no global instance.
pub struct Simulation {
    config: SimulationConfig,
    params: RunParams,
    env: Environment,
    cell_types: Vec<CellType>,
    region_rules: Vec<(Region, Box<dyn RegionRule>)>,
    cells: Vec<Cell>,
    staging: Staging,
    observers: Observers,
    rng: StdRng,
    state: RunState,
    /// Simulated time (min).
    time: f32,
    tick: u64,
    redraw_interval: Duration,
    last_redraw: Option<Instant>,
    /// Stores collected snapshots at record intervals.
    recorded_snapshots: Vec<Snapshot>,
    cancelled: bool,
    closed: bool,
}

fn context<'a>(
    env: &'a Environment,
    cell_types: &'a [CellType],
    staging: &'a Staging,
    params: &RunParams,
    time: f32,
    tick: u64,
) -> TickContext<'a> {
    TickContext { env, cell_types, staging, time, dt: params.dt, tick, seed: params.seed }
}

fn notice(cell: &Cell, event: LifecycleEvent) -> CellNotice {
    CellNotice { id: cell.id(), cell_type: cell.cell_type(), position: cell.position, event }
}

fn rule_fault(err: SimError, rule: &str) -> SimError {
    match err {
        fault @ SimError::RuntimeFault { .. } => fault,
        other => SimError::fault(None, rule, other.to_string()),
    }
}

/// Moves `cell` by `v * dt`; on a blocked or closed destination retries once at -0.25 of the
/// displacement, and otherwise stops the cell where it is.
fn try_move(env: &Environment, cell: &mut Cell, dt: f32) -> bool {
    let displacement = cell.velocity * dt;
    if displacement.length_squared() == 0.0 {
        return true;
    }
    if !displacement.is_finite() {
        cell.velocity = Vec2::zero();
        return false;
    }
    for candidate in [cell.position + displacement, cell.position + displacement * -0.25] {
        if env.can_enter(candidate) {
            cell.position = candidate;
            return true;
        }
    }
    cell.velocity = Vec2::zero();
    false
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        SimulationBuilder::new(config).build()
    }

    /// Advances the simulation by one tick of `dt`.
    pub fn tick(&mut self) -> SimResult<()> {
        if self.closed {
            return Err(SimError::fault(None, "simulation", "tick on a closed simulation"));
        }
        let dt = self.params.dt;
        let tick_start = Instant::now();

        // --- 1. EarlyUpdate (parallel): footprint and receptor refresh ---
        {
            let ctx = context(&self.env, &self.cell_types, &self.staging, &self.params, self.time, self.tick);
            self.cells
                .par_iter_mut()
                .try_for_each(|cell| cell.early_update(&ctx.cell_types[cell.cell_type()], &ctx))?;
        }

        // --- 2. Field diffusion/reaction ---
        self.env.update(dt);

        // --- 3. Region ticks (serial), then Update (parallel) ---
        {
            let ctx = context(&self.env, &self.cell_types, &self.staging, &self.params, self.time, self.tick);
            for (region, rule) in self.region_rules.iter().filter(|(_, rule)| rule.tick_active()) {
                rule.tick(&ctx, region).map_err(|e| rule_fault(e, rule.kind()))?;
            }
            self.cells
                .par_iter_mut()
                .try_for_each(|cell| cell.update(&ctx.cell_types[cell.cell_type()], &ctx))?;
        }

        // --- 4. Movement (serial) ---
        let mut stopped = 0usize;
        for cell in &mut self.cells {
            if !try_move(&self.env, cell, dt) {
                stopped += 1;
            }
        }

        // --- 5. Redraw, file output and snapshots ---
        let end_time = self.time + dt;
        let completed = self.tick + 1;
        self.maybe_redraw(end_time, completed);
        if self.params.output_period_steps > 0 && completed % self.params.output_period_steps == 0 {
            let records = self.position_records(end_time);
            let failed = self.observers.write_to_file(end_time, &records);
            if failed > 0 {
                warn!("{} observers failed to write at t = {:.3}.", failed, end_time);
            }
        }
        if completed % self.params.record_interval_steps.max(1) == 0 {
            self.record_snapshot_at(end_time);
        }

        // --- 6. Deferred removals ---
        let replaced = self.apply_removals();

        // --- 7. LateUpdate (parallel), then advance time ---
        {
            let ctx = context(&self.env, &self.cell_types, &self.staging, &self.params, self.time, self.tick);
            self.cells
                .par_iter_mut()
                .try_for_each(|cell| cell.late_update(&ctx.cell_types[cell.cell_type()], &ctx))?;
        }
        self.time = end_time;
        self.tick = completed;

        // --- 8. Cells created this tick join the live set ---
        self.merge_creations(&replaced)?;

        trace!(
            "Tick {} done in {:.2} ms: {} cells, {} stopped by obstacles.",
            self.tick,
            tick_start.elapsed().as_secs_f64() * 1000.0,
            self.cells.len(),
            stopped
        );
        Ok(())
    }

    fn maybe_redraw(&mut self, time: f32, tick: u64) {
        if self.observers.is_empty() {
            return;
        }
        let due = self.last_redraw.map_or(true, |last| last.elapsed() >= self.redraw_interval);
        if !due {
            return;
        }
        let frame = Frame {
            time,
            tick,
            sprites: self
                .cells
                .iter()
                .map(|c| Sprite {
                    id: c.id().0,
                    cell_type: c.cell_type(),
                    x: c.position.x,
                    y: c.position.y,
                    radius: c.radius(),
                    color: c.color(),
                })
                .collect(),
        };
        self.observers.redraw(&frame);
        self.last_redraw = Some(Instant::now());
    }

    /// Removes queued cells from the live set. Cells with a pending replacement are returned
    /// instead of being announced, so step 8 can report them as replaced.
    fn apply_removals(&mut self) -> HashMap<CellId, CellNotice> {
        let mut replaced = HashMap::new();
        let removals = self.staging.take_removals();
        if removals.is_empty() {
            return replaced;
        }

        let ids: HashSet<CellId> = removals.iter().map(|r| r.id).collect();
        let replacing = self.staging.replacement_targets();

        let mut removed: HashMap<CellId, Cell> = HashMap::with_capacity(removals.len());
        let mut kept = Vec::with_capacity(self.cells.len());
        for cell in self.cells.drain(..) {
            if ids.contains(&cell.id()) {
                removed.insert(cell.id(), cell);
            } else {
                kept.push(cell);
            }
        }
        self.cells = kept;

        for removal in removals {
            let Some(cell) = removed.remove(&removal.id) else {
                continue;
            };
            let gone = notice(&cell, removal.event);
            if replacing.contains(&removal.id) {
                replaced.insert(removal.id, gone);
            } else {
                self.observers.cell_removed(&gone);
            }
        }
        replaced
    }

    /// Turns queued creations into live cells, in id order.
    fn merge_creations(&mut self, replaced: &HashMap<CellId, CellNotice>) -> SimResult<()> {
        let mut announced = HashSet::new();
        for pending in self.staging.take_creations() {
            let cell_type = self.cell_types.get(pending.cell_type).ok_or_else(|| {
                SimError::fault(
                    Some(pending.id.0),
                    "staging",
                    format!("unknown cell type {}", pending.cell_type),
                )
            })?;
            let mut rng = StdRng::seed_from_u64(mix_seed(&[self.params.seed, pending.id.0, SPAWN_SALT]));
            let cell = Cell::new(pending.id, cell_type, pending.position, self.time, &mut rng);
            let added = notice(&cell, pending.event);
            self.cells.push(cell);

            match pending.replaces.and_then(|old| replaced.get(&old).map(|n| (old, n))) {
                Some((old, old_notice)) if announced.insert(old) => {
                    self.observers.cell_replaced(old_notice, &added)
                }
                _ => self.observers.cell_added(&added),
            }
        }
        Ok(())
    }

    /// Runs ticks until the configured duration is reached or the run is cancelled, honouring
    /// pause requests between ticks. Closes the simulation on exit.
    pub fn run_to_completion(&mut self, control: &RunControl) -> SimResult<()> {
        control.set_state(self.state);
        let start = Instant::now();
        let total_steps = self.params.total_steps;
        info!("Starting simulation loop for {} steps...", total_steps);

        while self.tick < total_steps {
            if control.is_cancelled() {
                self.cancelled = true;
                self.set_state(RunState::Cancelled);
                control.set_state(RunState::Cancelled);
                break;
            }
            if control.is_paused() {
                if self.state != RunState::Paused {
                    self.set_state(RunState::Paused);
                    control.set_state(RunState::Paused);
                }
                std::thread::sleep(PAUSE_POLL);
                continue;
            }
            if self.state == RunState::Paused {
                self.set_state(RunState::Running);
                control.set_state(RunState::Running);
            }

            if let Err(e) = self.tick() {
                error!("Simulation step {} failed: {}", self.tick + 1, e);
                self.set_state(RunState::Faulted);
                control.set_state(RunState::Faulted);
                self.close();
                return Err(e);
            }
            control.set_progress(self.tick);
        }

        let elapsed = start.elapsed();
        info!(
            "Simulation loop ended after {} steps in {:.3} seconds.",
            self.tick,
            elapsed.as_secs_f64()
        );
        self.close();
        control.set_state(self.state);
        Ok(())
    }

    /// Fires the close notification once and moves to `Closed` (a faulted run stays `Faulted`).
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.observers.closed(self.time);
        if self.state != RunState::Faulted {
            self.set_state(RunState::Closed);
        }
    }

    fn set_state(&mut self, state: RunState) {
        if self.state != state {
            info!("Simulation state: {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    /// Replaces the speed and/or radius range of a cell type and resamples every live cell of
    /// that type. Returns the number of cells resampled.
    pub fn update_cell_type_ranges(
        &mut self,
        cell_type: &str,
        speed: Option<RangeConfig>,
        radius: Option<RangeConfig>,
    ) -> SimResult<usize> {
        let index = self
            .cell_types
            .iter()
            .position(|t| t.name == cell_type)
            .ok_or_else(|| SimError::Configuration(format!("unknown cell type '{}'", cell_type)))?;
        let context = format!("cell type '{}'", cell_type);
        let sanitize = |name: &str, range: RangeConfig| {
            let min = clamp_param(&context, &format!("{}.min", name), range.min, 0.0, f32::MAX);
            let max = clamp_param(&context, &format!("{}.max", name), range.max, min, f32::MAX);
            RangeConfig { min, max }
        };
        if let Some(speed) = speed {
            self.cell_types[index].speed = sanitize("speed_um_per_min", speed);
        }
        if let Some(radius) = radius {
            self.cell_types[index].radius = sanitize("radius_um", radius);
        }

        let cell_type = &self.cell_types[index];
        let rng = &mut self.rng;
        let mut count = 0;
        for cell in self.cells.iter_mut().filter(|c| c.cell_type() == index) {
            cell.resample(cell_type, rng);
            count += 1;
        }
        info!("Resampled {} cells of type '{}'.", count, cell_type.name);
        Ok(count)
    }

    /// Queues a new cell from outside the tick loop; it becomes live at the end of the next tick
    /// and is announced through `cell_added`.
    pub fn request_cell(&self, cell_type: usize, position: Vec2) {
        self.staging.add_cell(None, cell_type, position, LifecycleEvent::JustAppeared);
    }

    /// Queues removal of a live cell; applied during the next tick.
    pub fn request_removal(&self, id: CellId, event: LifecycleEvent) {
        self.staging.remove_cell(id, event);
    }

    /// Collects the current state as a Snapshot and stores it.
    pub fn record_snapshot(&mut self) {
        self.record_snapshot_at(self.time);
    }

    fn record_snapshot_at(&mut self, time: f32) {
        let positions = if self.config.output.save_positions_in_snapshot {
            Some(self.get_results())
        } else {
            None
        };
        let snapshot = Snapshot {
            time,
            cell_count: self.cells.len() as u32,
            mean_concentrations: (0..self.env.ligands().len())
                .map(|l| self.env.mean_concentration(l))
                .collect(),
            positions,
        };
        debug!(
            "Snapshot at {:.2} min: {} cells, mean concentrations {:?}",
            snapshot.time, snapshot.cell_count, snapshot.mean_concentrations
        );
        self.recorded_snapshots.push(snapshot);
    }

    /// Position log rows for every live cell.
    pub fn position_records(&self, time: f32) -> Vec<PositionRecord> {
        self.cells
            .iter()
            .map(|c| PositionRecord {
                time,
                cell_type: self.cell_types[c.cell_type()].name.clone(),
                id: c.id().0,
                x: c.position.x,
                y: c.position.y,
                mean_weighted_activity: c.mean_weighted_activity(),
            })
            .collect()
    }

    /// Positions (um) of all live cells.
    pub fn get_results(&self) -> Vec<(f32, f32)> {
        self.cells.iter().map(|c| (c.position.x, c.position.y)).collect()
    }

    pub fn get_recorded_snapshots(&self) -> &[Snapshot] {
        &self.recorded_snapshots
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Mutable field access between ticks (initial conditions, probes).
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id() == id)
    }

    pub fn cell_types(&self) -> &[CellType] {
        &self.cell_types
    }

    pub fn cell_type_index(&self, name: &str) -> Option<usize> {
        self.cell_types.iter().position(|t| t.name == name)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r##"
        seed = 3
        [domain]
        width = 30
        height = 30
        dx_um = 2.0
        [timing]
        physics_dt_min = 0.1
        total_time_min = 2.0
        record_interval_min = 0.5
        [[ligands]]
        name = "a"
        diffusivity_um2_per_min = 10.0
        [[cell_types]]
        name = "amoeba"
        speed_um_per_min = { min = 1.0, max = 2.0 }
        radius_um = { min = 3.0, max = 3.0 }
        [[cell_types.components]]
        kind = "random_walk"
        [[regions]]
        color = "#ffffff"
        rules = [{ kind = "seed", cell_type = "amoeba", count = 4 }]
    "##;

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig::from_toml_str(CONFIG).expect("config")).expect("simulation")
    }

    #[test]
    fn seeding_makes_cells_live_before_the_first_tick() {
        let sim = sim();
        assert_eq!(sim.cells().len(), 4);
        assert_eq!(sim.state(), RunState::Running);
        assert_eq!(sim.get_recorded_snapshots().len(), 1);
    }

    #[test]
    fn run_to_completion_advances_time_and_closes() {
        let mut sim = sim();
        let control = RunControl::new();
        sim.run_to_completion(&control).expect("run");
        assert_eq!(sim.tick_count(), 20);
        assert!((sim.time() - 2.0).abs() < 1e-4);
        assert_eq!(sim.state(), RunState::Closed);
        assert_eq!(control.state(), RunState::Closed);
        // t = 0 plus every 5 steps
        assert_eq!(sim.get_recorded_snapshots().len(), 5);
        assert!(sim.tick().is_err());
    }

    #[test]
    fn cancelled_run_stops_at_a_tick_boundary() {
        let mut sim = sim();
        let control = RunControl::new();
        control.cancel();
        sim.run_to_completion(&control).expect("run");
        assert_eq!(sim.tick_count(), 0);
        assert!(sim.was_cancelled());
        assert_eq!(sim.state(), RunState::Closed);
    }

    #[test]
    fn resampling_applies_new_ranges() {
        let mut sim = sim();
        let count = sim
            .update_cell_type_ranges("amoeba", Some(RangeConfig::fixed(7.0)), Some(RangeConfig { min: 5.0, max: 1.0 }))
            .expect("update");
        assert_eq!(count, 4);
        assert!(sim.cells().iter().all(|c| c.base_speed() == 7.0 && c.radius() == 5.0));
        assert!(sim.update_cell_type_ranges("ghost", None, None).is_err());
    }

    #[test]
    fn move_retries_backwards_then_stops() {
        let mut env = Environment::open(10, 3, 1.0, vec![Ligand { name: "a".into(), diffusivity: 0.0 }]).unwrap();
        for y in 0..3 {
            env.set_flag(6, y, crate::field::PointFlags::BLOCK, true);
        }
        let cell_type = CellType::bare(0, "t", RangeConfig::fixed(1.0), RangeConfig::fixed(1.0));
        let mut cell = Cell::new(CellId(1), &cell_type, Vec2::new(4.0, 1.0), 0.0, &mut StdRng::seed_from_u64(0));

        cell.velocity = Vec2::new(20.0, 0.0);
        assert!(try_move(&env, &mut cell, 0.1));
        // +2 lands on the wall, -0.5 is free
        assert_eq!(cell.position, Vec2::new(3.5, 1.0));

        // off the grid both ways
        cell.velocity = Vec2::new(0.0, 100.0);
        assert!(!try_move(&env, &mut cell, 0.1));
        assert_eq!(cell.position, Vec2::new(3.5, 1.0));
        assert_eq!(cell.velocity, Vec2::zero());
    }
}
