//! Field grid: point flags, per-ligand concentration buffers, the reaction accumulator and the
//! diffusion/reaction step delegated to a compute backend.

pub mod backend;
pub mod flags;
pub mod reaction;

pub use backend::{
    select_backend, BackendKind, BackendProvider, ComputeBackend, CpuBackend, LigandField, StepPlan,
    Topology,
};
pub use flags::PointFlags;
pub use reaction::{ReactionAccumulator, ReactionOrder};

use crate::error::{SimError, SimResult};
use crate::grid::GridGeometry;
use crate::layout::{Layout, Region};
use chemotaxis_common::Vec2;
use log::{debug, trace, warn};

/// Upper bound on diffusion substeps per update, reached only with extreme dt or diffusivity.
const MAX_SUBSTEPS: u32 = 10_000;

/// A diffusing chemical species tracked on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Ligand {
    pub name: String,
    /// um^2/min.
    pub diffusivity: f32,
}

/// The simulated environment: a uniform grid holding every ligand field.
pub struct Environment {
    geometry: GridGeometry,
    flags: Vec<PointFlags>,
    ligands: Vec<Ligand>,
    fields: Vec<LigandField>,
    reactions: ReactionAccumulator,
    /// Drained reaction terms for the update in progress.
    reaction_terms: Vec<f32>,
    scratch: Vec<f32>,
    regions: Vec<Region>,
    backend: Box<dyn ComputeBackend>,
}

impl Environment {
    /// Builds the field grid from a parsed layout. Open layout points are flagged FREE.
    pub fn new(
        layout: Layout,
        dx: f32,
        ligands: Vec<Ligand>,
        backend: Box<dyn ComputeBackend>,
    ) -> SimResult<Self> {
        if !(dx > 0.0) {
            return Err(SimError::Initialization(format!("grid spacing must be positive, got {}", dx)));
        }
        if ligands.is_empty() {
            return Err(SimError::Initialization("no ligands declared".to_string()));
        }
        let geometry = GridGeometry::new(layout.width, layout.height, dx);
        let flags = layout
            .open
            .iter()
            .map(|&open| if open { PointFlags::FREE } else { PointFlags::NONE })
            .collect();
        let fields = ligands.iter().map(|_| LigandField::uniform(geometry.len(), 0.0)).collect();

        debug!(
            "Allocated {} ligand fields on a {}x{} grid (dx = {} um).",
            ligands.len(),
            geometry.width,
            geometry.height,
            dx
        );

        Ok(Self {
            geometry,
            flags,
            reactions: ReactionAccumulator::new(geometry.len(), ligands.len()),
            ligands,
            fields,
            reaction_terms: Vec::new(),
            scratch: Vec::new(),
            regions: layout.regions,
            backend,
        })
    }

    /// Fully open grid on the parallel CPU backend.
    pub fn open(width: usize, height: usize, dx: f32, ligands: Vec<Ligand>) -> SimResult<Self> {
        Self::new(Layout::open(width, height), dx, ligands, Box::new(CpuBackend::parallel()))
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn ligands(&self) -> &[Ligand] {
        &self.ligands
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Substep split for a macro step of `dt` minutes.
    ///
    /// `k = 2 dt D_max / dx^2` is the normalized diffusion number of the fastest ligand; the step
    /// is cut into `ceil(k)` substeps so each substep's number stays at or below 1.
    pub fn step_plan(&self, dt: f32) -> StepPlan {
        let dx2 = self.geometry.dx * self.geometry.dx;
        let d_max = self.ligands.iter().map(|l| l.diffusivity).fold(0.0f32, f32::max);
        let k = 2.0 * dt * d_max / dx2;

        // The small slack keeps f32 round-off in k from adding a substep.
        let mut substeps = if k > 1.0 { (k - 1e-4).ceil() as u32 } else { 1 };
        if substeps > MAX_SUBSTEPS {
            warn!("Diffusion number {:.1} needs {} substeps, capping at {}.", k, substeps, MAX_SUBSTEPS);
            substeps = MAX_SUBSTEPS;
        }
        let dt_sub = dt / substeps as f32;

        StepPlan {
            substeps,
            dt_sub,
            diffusion_numbers: self
                .ligands
                .iter()
                .map(|l| 2.0 * l.diffusivity * dt_sub / dx2)
                .collect(),
            apply_reactions: self.reactions.has_pending(),
        }
    }

    /// Advances every ligand field by `dt` minutes, consuming the reaction terms pushed since
    /// the previous update. Reads after this call see the new level.
    pub fn update(&mut self, dt: f32) {
        if !(dt > 0.0) {
            return;
        }
        let plan = self.step_plan(dt);
        if plan.apply_reactions {
            self.reactions.drain_into(&mut self.reaction_terms);
        } else {
            self.reaction_terms.clear();
        }
        trace!(
            "Field update: dt = {}, {} substeps, reactions = {}.",
            dt,
            plan.substeps,
            plan.apply_reactions
        );

        let topology = Topology { geometry: self.geometry, flags: &self.flags };
        self.backend.advance(
            &topology,
            &mut self.fields,
            &self.reaction_terms,
            &plan,
            &mut self.scratch,
        );
    }

    // --- Point queries ---

    /// Concentration at grid point `(x, y)`; 0 outside the grid or for an unknown ligand.
    pub fn concentration(&self, ligand: usize, x: i64, y: i64) -> f32 {
        self.geometry
            .checked_index(x, y)
            .map(|idx| self.concentration_index(ligand, idx))
            .unwrap_or(0.0)
    }

    /// Concentration at the grid point nearest to a micron position (no interpolation).
    pub fn concentration_at(&self, ligand: usize, pos: Vec2) -> f32 {
        self.geometry
            .nearest_point(pos)
            .map(|idx| self.concentration_index(ligand, idx))
            .unwrap_or(0.0)
    }

    #[inline(always)]
    pub fn concentration_index(&self, ligand: usize, idx: usize) -> f32 {
        self.fields
            .get(ligand)
            .and_then(|f| f.curr.get(idx))
            .copied()
            .unwrap_or(0.0)
    }

    /// Sets a point's concentration at all three time levels so the value is stable.
    /// Negative values are clamped to zero.
    pub fn set_concentration(&mut self, ligand: usize, x: i64, y: i64, value: f32) {
        if let Some(idx) = self.geometry.checked_index(x, y) {
            self.set_concentration_index(ligand, idx, value);
        }
    }

    pub fn set_concentration_index(&mut self, ligand: usize, idx: usize, value: f32) {
        let Some(field) = self.fields.get_mut(ligand) else {
            warn!("set_concentration on unknown ligand {} ignored.", ligand);
            return;
        };
        if idx >= field.curr.len() {
            return;
        }
        let value = if value.is_finite() { value.max(0.0) } else { 0.0 };
        field.prev[idx] = value;
        field.curr[idx] = value;
        field.next[idx] = value;
    }

    /// Fills a whole ligand field with one value.
    pub fn fill_concentration(&mut self, ligand: usize, value: f32) {
        if let Some(field) = self.fields.get_mut(ligand) {
            let value = value.max(0.0);
            field.prev.fill(value);
            field.curr.fill(value);
            field.next.fill(value);
        }
    }

    /// Mean concentration of a ligand over FREE points.
    pub fn mean_concentration(&self, ligand: usize) -> f32 {
        let Some(field) = self.fields.get(ligand) else {
            return 0.0;
        };
        let (sum, count) = field
            .curr
            .iter()
            .zip(&self.flags)
            .filter(|(_, f)| f.contains(PointFlags::FREE))
            .fold((0.0f64, 0usize), |(s, n), (c, _)| (s + *c as f64, n + 1));
        if count == 0 {
            0.0
        } else {
            (sum / count as f64) as f32
        }
    }

    /// Current (level t) buffer of a ligand.
    pub fn field(&self, ligand: usize) -> Option<&[f32]> {
        self.fields.get(ligand).map(|f| &f.curr[..])
    }

    // --- Flags ---

    pub fn flags_index(&self, idx: usize) -> PointFlags {
        self.flags.get(idx).copied().unwrap_or(PointFlags::NONE)
    }

    pub fn get_flag(&self, x: i64, y: i64, flag: PointFlags) -> bool {
        self.geometry
            .checked_index(x, y)
            .is_some_and(|idx| self.flags[idx].contains(flag))
    }

    pub fn set_flag(&mut self, x: i64, y: i64, flag: PointFlags, on: bool) {
        if let Some(idx) = self.geometry.checked_index(x, y) {
            self.set_flag_index(idx, flag, on);
        }
    }

    pub fn set_flag_index(&mut self, idx: usize, flag: PointFlags, on: bool) {
        if let Some(flags) = self.flags.get_mut(idx) {
            if on {
                flags.insert(flag);
            } else {
                flags.remove(flag);
            }
        }
    }

    #[inline(always)]
    pub fn is_open_index(&self, idx: usize) -> bool {
        self.flags_index(idx).contains(PointFlags::FREE)
    }

    /// True if the nearest grid point to `pos` is FREE. Off-grid positions are not open.
    pub fn is_open(&self, pos: Vec2) -> bool {
        self.geometry.nearest_point(pos).is_some_and(|idx| self.is_open_index(idx))
    }

    /// True if the nearest grid point to `pos` blocks movement.
    pub fn blocked(&self, pos: Vec2) -> bool {
        self.geometry
            .nearest_point(pos)
            .is_some_and(|idx| self.flags[idx].contains(PointFlags::BLOCK))
    }

    /// A cell may occupy `pos`: open and not blocked.
    pub fn can_enter(&self, pos: Vec2) -> bool {
        self.is_open(pos) && !self.blocked(pos)
    }

    // --- Reactions ---

    /// Accumulates a rate term for `target` at grid point `(x, y)`, applied by the next update.
    /// `source` only matters for first-order terms.
    pub fn push_reaction(
        &self,
        x: i64,
        y: i64,
        rate: f32,
        order: ReactionOrder,
        target: usize,
        source: usize,
    ) {
        if let Some(idx) = self.geometry.checked_index(x, y) {
            self.reactions.push(idx, order, target, source, rate);
        }
    }

    pub fn push_reaction_index(
        &self,
        idx: usize,
        rate: f32,
        order: ReactionOrder,
        target: usize,
        source: usize,
    ) {
        self.reactions.push(idx, order, target, source, rate);
    }

    /// Consumes `input` at the point nearest to `pos` with a zeroth-order rate `rate0` (capped
    /// so one step of length `dt` cannot take more than is present) and a first-order rate
    /// `rate1`, optionally producing `output` at `io_ratio` times the consumed amount.
    #[allow(clippy::too_many_arguments)]
    pub fn degrade_at_rate(
        &self,
        input: usize,
        output: Option<usize>,
        pos: Vec2,
        rate0: f32,
        rate1: f32,
        io_ratio: f32,
        dt: f32,
    ) {
        let Some(idx) = self.geometry.nearest_point(pos) else {
            return;
        };
        let available = self.concentration_index(input, idx);
        let rate0 = if dt > 0.0 { rate0.max(0.0).min(available / dt) } else { rate0.max(0.0) };
        let rate1 = rate1.max(0.0);

        self.reactions.push(idx, ReactionOrder::Zeroth, input, input, -rate0);
        self.reactions.push(idx, ReactionOrder::First, input, input, -rate1);
        if let Some(output) = output {
            self.reactions.push(idx, ReactionOrder::Zeroth, output, output, rate0 * io_ratio);
            self.reactions.push(idx, ReactionOrder::First, output, input, rate1 * io_ratio);
        }
    }

    /// Pending (not yet applied) reaction term.
    pub fn pending_reaction(&self, idx: usize, order: ReactionOrder, target: usize, source: usize) -> f32 {
        self.reactions.get(idx, order, target, source)
    }
}
