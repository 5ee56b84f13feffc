use super::flags::PointFlags;
use crate::error::SimResult;
use crate::grid::GridGeometry;
use chemotaxis_common::BackendPreference;
use log::{debug, info};
use rayon::prelude::*;

/// Concentration of one ligand at three time levels (leapfrog scheme).
#[derive(Debug, Clone)]
pub struct LigandField {
    /// Level t-1.
    pub prev: Vec<f32>,
    /// Level t.
    pub curr: Vec<f32>,
    /// Level t+1, written by the diffusion kernel.
    pub next: Vec<f32>,
}

impl LigandField {
    pub fn uniform(len: usize, value: f32) -> Self {
        Self {
            prev: vec![value; len],
            curr: vec![value; len],
            next: vec![value; len],
        }
    }

    /// t-1 <- t, t <- t+1. The old t-1 buffer is reused as the next output.
    pub fn rotate(&mut self) {
        std::mem::swap(&mut self.prev, &mut self.curr);
        std::mem::swap(&mut self.curr, &mut self.next);
    }
}

/// Read-only view of the grid shape and point flags handed to kernels.
#[derive(Clone, Copy)]
pub struct Topology<'a> {
    pub geometry: GridGeometry,
    pub flags: &'a [PointFlags],
}

/// How one `update(dt)` call is split into substeps.
#[derive(Debug, Clone, PartialEq)]
pub struct StepPlan {
    pub substeps: u32,
    pub dt_sub: f32,
    /// Per-ligand normalized diffusion number `2 * D * dt_sub / dx^2`.
    pub diffusion_numbers: Vec<f32>,
    pub apply_reactions: bool,
}

/// Class of compute device, listed in probing priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BackendKind {
    DiscreteAccelerator,
    GeneralAccelerator,
    ParallelCpu,
    SerialCpu,
}

/// Executes the diffusion/reaction kernels for every substep of one field update.
///
/// Implementations must produce the same result as the CPU kernels for the same inputs.
/// `advance` covers all substeps so a device backend transfers data once per call.
pub trait ComputeBackend: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> BackendKind;
    /// `reactions` is the drained per-point reaction matrix (empty when `plan.apply_reactions`
    /// is false); `scratch` is reusable working memory.
    fn advance(
        &self,
        topology: &Topology<'_>,
        fields: &mut [LigandField],
        reactions: &[f32],
        plan: &StepPlan,
        scratch: &mut Vec<f32>,
    );
}

/// Probe for an optional accelerator backend, registered by the embedding application.
pub trait BackendProvider: Send + Sync {
    fn kind(&self) -> BackendKind;
    /// Returns `None` when the device is not present.
    fn probe(&self) -> Option<Box<dyn ComputeBackend>>;
}

/// Picks a backend: registered accelerators in priority order, then the CPU kernels.
/// The serial CPU backend is the final fallback and always succeeds.
pub fn select_backend(
    preference: BackendPreference,
    providers: &[Box<dyn BackendProvider>],
) -> SimResult<Box<dyn ComputeBackend>> {
    let backend: Box<dyn ComputeBackend> = match preference {
        BackendPreference::SerialCpu => Box::new(CpuBackend::serial()),
        BackendPreference::ParallelCpu => Box::new(CpuBackend::parallel()),
        BackendPreference::Auto => {
            let mut ordered: Vec<&Box<dyn BackendProvider>> = providers.iter().collect();
            ordered.sort_by_key(|p| p.kind());
            let probed = ordered.into_iter().find_map(|provider| {
                let found = provider.probe();
                if found.is_none() {
                    debug!("No {:?} backend available.", provider.kind());
                }
                found
            });
            match probed {
                Some(backend) => backend,
                None if rayon::current_num_threads() > 1 => Box::new(CpuBackend::parallel()),
                None => Box::new(CpuBackend::serial()),
            }
        }
    };
    info!("Field grid compute backend: {} ({:?}).", backend.name(), backend.kind());
    Ok(backend)
}

/// CPU implementation of the kernels, row-parallel through Rayon or single-threaded.
#[derive(Debug, Clone, Copy)]
pub struct CpuBackend {
    threaded: bool,
}

impl CpuBackend {
    pub fn parallel() -> Self {
        Self { threaded: true }
    }

    pub fn serial() -> Self {
        Self { threaded: false }
    }

    /// Explicit leapfrog update of one ligand into `field.next`.
    fn diffuse(&self, topology: &Topology<'_>, field: &mut LigandField, r: f32) {
        let LigandField { prev, curr, next } = field;
        let (prev, curr) = (&prev[..], &curr[..]);
        let width = topology.geometry.width;
        for_each_row(self.threaded, next, width, |y, row| {
            for (x, out) in row.iter_mut().enumerate() {
                let idx = y * width + x;
                *out = diffuse_point(topology, prev, curr, idx, r);
            }
        });
    }

    /// Adds each point's reaction amount, spread over its 5-point stencil, to levels t and t+1.
    fn react(
        &self,
        topology: &Topology<'_>,
        fields: &mut [LigandField],
        reactions: &[f32],
        dt_sub: f32,
        scratch: &mut Vec<f32>,
    ) {
        let geometry = topology.geometry;
        let num_points = geometry.len();
        let num_ligands = fields.len();
        let width = geometry.width;
        let height = geometry.height;
        let stride = (1 + num_ligands) * num_ligands;

        // --- Reaction amount per (target ligand, point), from the freshly diffused level ---
        scratch.resize(num_ligands * num_points, 0.0);
        {
            let levels: Vec<&[f32]> = fields.iter().map(|f| &f.next[..]).collect();
            for_each_row(self.threaded, scratch, width, |chunk, row| {
                let target = chunk / height;
                let y = chunk % height;
                for (x, out) in row.iter_mut().enumerate() {
                    let idx = y * width + x;
                    *out = if topology.flags[idx].is_simulated() {
                        let terms = &reactions[idx * stride..(idx + 1) * stride];
                        let mut rate = terms[target];
                        for (source, level) in levels.iter().enumerate() {
                            rate += terms[(1 + source) * num_ligands + target] * level[idx];
                        }
                        rate * dt_sub
                    } else {
                        0.0
                    };
                }
            });
        }

        // --- Distribute over the stencil ---
        for (target, field) in fields.iter_mut().enumerate() {
            let amounts = &scratch[target * num_points..(target + 1) * num_points];
            let LigandField { curr, next, .. } = field;
            for_each_row_pair(self.threaded, next, curr, width, |y, next_row, curr_row| {
                for x in 0..width {
                    let idx = y * width + x;
                    if !topology.flags[idx].is_simulated() {
                        continue;
                    }
                    let inc = stencil_increment(topology, amounts, idx);
                    if inc != 0.0 {
                        next_row[x] = (next_row[x] + inc).max(0.0);
                        curr_row[x] = (curr_row[x] + inc).max(0.0);
                    }
                }
            });
        }
    }
}

impl ComputeBackend for CpuBackend {
    fn name(&self) -> &str {
        if self.threaded {
            "parallel-cpu"
        } else {
            "serial-cpu"
        }
    }

    fn kind(&self) -> BackendKind {
        if self.threaded {
            BackendKind::ParallelCpu
        } else {
            BackendKind::SerialCpu
        }
    }

    fn advance(
        &self,
        topology: &Topology<'_>,
        fields: &mut [LigandField],
        reactions: &[f32],
        plan: &StepPlan,
        scratch: &mut Vec<f32>,
    ) {
        for _ in 0..plan.substeps {
            for (field, &r) in fields.iter_mut().zip(&plan.diffusion_numbers) {
                self.diffuse(topology, field, r);
            }
            if plan.apply_reactions {
                self.react(topology, fields, reactions, plan.dt_sub, scratch);
            }
            fields.iter_mut().for_each(LigandField::rotate);
        }
    }
}

/// DuFort-Frankel update of one point:
/// `c[t+1] = ((1 - 2r) c[t-1] + r * sum(neighbours[t])) / (1 + 2r)`.
/// Neighbours that are not FREE (or off-grid) contribute the centre value (zero flux).
/// Points that are not simulated keep their value.
#[inline(always)]
fn diffuse_point(topology: &Topology<'_>, prev: &[f32], curr: &[f32], idx: usize, r: f32) -> f32 {
    let center = curr[idx];
    if !topology.flags[idx].is_simulated() {
        return center;
    }
    let mut sum = 0.0;
    for neighbor in topology.geometry.neighbors(idx) {
        sum += match neighbor {
            Some(j) if topology.flags[j].contains(PointFlags::FREE) => curr[j],
            _ => center,
        };
    }
    ((1.0 - 2.0 * r) * prev[idx] + r * sum) / (1.0 + 2.0 * r)
}

const STENCIL_CENTER: f32 = 0.5;
const STENCIL_ARM: f32 = 0.125;

/// Gathers the share of every stencil that lands on `idx`: half of its own amount, an eighth
/// of each neighbour's, plus the eighths of its own amount that could not land on a neighbour.
#[inline(always)]
fn stencil_increment(topology: &Topology<'_>, amounts: &[f32], idx: usize) -> f32 {
    let own = amounts[idx];
    let mut inc = STENCIL_CENTER * own;
    for neighbor in topology.geometry.neighbors(idx) {
        match neighbor {
            Some(j) if topology.flags[j].is_simulated() => inc += STENCIL_ARM * amounts[j],
            _ => inc += STENCIL_ARM * own,
        }
    }
    inc
}

fn for_each_row<F>(threaded: bool, data: &mut [f32], width: usize, f: F)
where
    F: Fn(usize, &mut [f32]) + Send + Sync,
{
    if threaded {
        data.par_chunks_mut(width).enumerate().for_each(|(y, row)| f(y, row));
    } else {
        data.chunks_mut(width).enumerate().for_each(|(y, row)| f(y, row));
    }
}

fn for_each_row_pair<F>(threaded: bool, a: &mut [f32], b: &mut [f32], width: usize, f: F)
where
    F: Fn(usize, &mut [f32], &mut [f32]) + Send + Sync,
{
    if threaded {
        a.par_chunks_mut(width)
            .zip(b.par_chunks_mut(width))
            .enumerate()
            .for_each(|(y, (ra, rb))| f(y, ra, rb));
    } else {
        a.chunks_mut(width)
            .zip(b.chunks_mut(width))
            .enumerate()
            .for_each(|(y, (ra, rb))| f(y, ra, rb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MissingDevice(BackendKind);

    impl BackendProvider for MissingDevice {
        fn kind(&self) -> BackendKind {
            self.0
        }
        fn probe(&self) -> Option<Box<dyn ComputeBackend>> {
            None
        }
    }

    #[test]
    fn auto_selection_falls_back_to_cpu() {
        let providers: Vec<Box<dyn BackendProvider>> = vec![
            Box::new(MissingDevice(BackendKind::GeneralAccelerator)),
            Box::new(MissingDevice(BackendKind::DiscreteAccelerator)),
        ];
        let backend = select_backend(BackendPreference::Auto, &providers).expect("backend");
        assert!(matches!(backend.kind(), BackendKind::ParallelCpu | BackendKind::SerialCpu));
        let serial = select_backend(BackendPreference::SerialCpu, &providers).expect("backend");
        assert_eq!(serial.kind(), BackendKind::SerialCpu);
    }

    #[test]
    fn rotate_moves_levels_back() {
        let mut field = LigandField { prev: vec![1.0], curr: vec![2.0], next: vec![3.0] };
        field.rotate();
        assert_eq!((field.prev[0], field.curr[0]), (2.0, 3.0));
    }

    #[test]
    fn parallel_and_serial_kernels_agree() {
        let geometry = GridGeometry::new(7, 5, 2.0);
        let mut flags = vec![PointFlags::FREE; geometry.len()];
        flags[geometry.index(3, 2)] = PointFlags::NONE;
        flags[geometry.index(1, 1)] |= PointFlags::FIXED;
        let topology = Topology { geometry, flags: &flags };

        let mut initial = LigandField::uniform(geometry.len(), 0.0);
        for (i, v) in initial.curr.iter_mut().enumerate() {
            *v = (i % 5) as f32;
        }
        initial.prev = initial.curr.clone();
        let mut reactions = vec![0.0; geometry.len() * 2];
        reactions[geometry.index(5, 3) * 2] = 4.0;
        let plan = StepPlan {
            substeps: 3,
            dt_sub: 0.1,
            diffusion_numbers: vec![0.4],
            apply_reactions: true,
        };

        let mut a = vec![initial.clone()];
        let mut b = vec![initial];
        CpuBackend::parallel().advance(&topology, &mut a, &reactions, &plan, &mut Vec::new());
        CpuBackend::serial().advance(&topology, &mut b, &reactions, &plan, &mut Vec::new());
        assert_eq!(a[0].curr, b[0].curr);
        assert_eq!(a[0].prev, b[0].prev);
    }
}
