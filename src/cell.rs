//! The cell agent: position and motion state, cached local footprint and receptor state, and
//! per-component extension slots.

use crate::components::TickContext;
use crate::error::{SimError, SimResult};
use crate::field::Environment;
use crate::kinetics;
use crate::model::CellType;
use chemotaxis_common::{RangeConfig, Vec2};
use rand::Rng;
use serde::Serialize;
use std::any::Any;
use std::f32::consts::TAU;

/// Stable identity of a cell for its whole lifetime. Ids are never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellId(pub u64);

/// Cached per-receptor signal.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReceptorState {
    pub weight: f32,
    /// Mean occupancy over the footprint, in [0, 1].
    pub occupancy: f32,
    /// Mean efficacy over the footprint, in [0, 1].
    pub activity: f32,
    /// Mean of `efficacy(p) * (p - centroid)` over the footprint (um).
    pub difference: Vec2,
}

/// Per-cell storage for component state, one slot per component of the cell's type.
#[derive(Default)]
pub struct ExtensionState {
    slots: Vec<Option<Box<dyn Any + Send + Sync>>>,
}

impl ExtensionState {
    pub fn get<T: Any>(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot)?.as_deref()?.downcast_ref::<T>()
    }

    pub fn get_mut<T: Any>(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot)?.as_deref_mut()?.downcast_mut::<T>()
    }

    /// State in `slot`, created with `init` if the slot is empty or holds another type.
    pub fn get_or_insert_with<T, F>(&mut self, slot: usize, init: F) -> &mut T
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        if self.slots.len() <= slot {
            self.slots.resize_with(slot + 1, || None);
        }
        let entry = &mut self.slots[slot];
        match entry {
            Some(value) if value.is::<T>() => {}
            _ => *entry = Some(Box::new(init())),
        }
        match entry.as_deref_mut().and_then(|v| v.downcast_mut::<T>()) {
            Some(value) => value,
            None => unreachable!("extension slot {} was just filled", slot),
        }
    }

    pub fn clear(&mut self, slot: usize) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = None;
        }
    }
}

impl std::fmt::Debug for ExtensionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.slots.iter().filter(|s| s.is_some()).count();
        write!(f, "ExtensionState({} of {} slots used)", used, self.slots.len())
    }
}

#[derive(Debug)]
pub struct Cell {
    id: CellId,
    cell_type: usize,
    pub position: Vec2,
    /// um/min.
    pub velocity: Vec2,
    /// Direction of travel in radians, owned by movement components.
    pub heading: f32,
    radius: f32,
    base_speed: f32,
    speed: f32,
    color: [u8; 3],
    footprint: Vec<usize>,
    centroid: Vec2,
    /// Receptor state as last sensed from the field.
    sensed: Vec<ReceptorState>,
    /// Working copies after value modifiers.
    receptors: Vec<ReceptorState>,
    birth_time: f32,
    pub extension: ExtensionState,
}

fn sample_range<R: Rng + ?Sized>(range: RangeConfig, rng: &mut R) -> f32 {
    if range.max > range.min {
        rng.random_range(range.min..=range.max)
    } else {
        range.min
    }
}

/// Gives a component error the cell and component it came from.
fn attribute(err: SimError, cell: CellId, component: &str) -> SimError {
    match err {
        SimError::RuntimeFault { cell: None, component, message } => {
            SimError::RuntimeFault { cell: Some(cell.0), component, message }
        }
        fault @ SimError::RuntimeFault { .. } => fault,
        other => SimError::fault(Some(cell.0), component, other.to_string()),
    }
}

impl Cell {
    /// New cell of `cell_type` with radius and speed sampled from the type's ranges.
    pub fn new<R: Rng + ?Sized>(
        id: CellId,
        cell_type: &CellType,
        position: Vec2,
        birth_time: f32,
        rng: &mut R,
    ) -> Self {
        let base_speed = sample_range(cell_type.speed, rng);
        let initial: Vec<ReceptorState> = cell_type
            .receptors
            .iter()
            .map(|r| ReceptorState { weight: r.weight, ..Default::default() })
            .collect();
        Self {
            id,
            cell_type: cell_type.index,
            position,
            velocity: Vec2::zero(),
            heading: rng.random_range(0.0..TAU),
            radius: sample_range(cell_type.radius, rng),
            base_speed,
            speed: base_speed,
            color: cell_type.color,
            footprint: Vec::new(),
            centroid: position,
            sensed: initial.clone(),
            receptors: initial,
            birth_time,
            extension: ExtensionState::default(),
        }
    }

    pub fn id(&self) -> CellId {
        self.id
    }

    pub fn cell_type(&self) -> usize {
        self.cell_type
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Speed after modifiers (um/min).
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Speed sampled from the type's range, before modifiers.
    pub fn base_speed(&self) -> f32 {
        self.base_speed
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    pub fn birth_time(&self) -> f32 {
        self.birth_time
    }

    /// Open grid points within `radius + dx` of the centre, as of the last refresh.
    pub fn footprint(&self) -> &[usize] {
        &self.footprint
    }

    pub fn centroid(&self) -> Vec2 {
        self.centroid
    }

    /// Working receptor state (after modifiers once the Update phase has started).
    pub fn receptor(&self, receptor: usize) -> Option<&ReceptorState> {
        self.receptors.get(receptor)
    }

    pub fn receptors(&self) -> &[ReceptorState] {
        &self.receptors
    }

    /// Receptor state exactly as sensed from the field.
    pub fn sensed(&self, receptor: usize) -> Option<&ReceptorState> {
        self.sensed.get(receptor)
    }

    /// Draws new radius and speed from the type's (changed) ranges.
    pub fn resample<R: Rng + ?Sized>(&mut self, cell_type: &CellType, rng: &mut R) {
        self.radius = sample_range(cell_type.radius, rng);
        self.base_speed = sample_range(cell_type.speed, rng);
        self.speed = self.base_speed;
    }

    /// Recomputes the open points within `radius + dx` of the centre and their centroid.
    pub fn update_local_footprint(&mut self, env: &Environment) {
        let geometry = *env.geometry();
        let footprint = &mut self.footprint;
        footprint.clear();
        let mut sum = Vec2::zero();
        geometry.for_each_point_within(self.position, self.radius + geometry.dx, |idx| {
            if env.is_open_index(idx) {
                footprint.push(idx);
                sum += geometry.point_position(idx);
            }
        });
        self.centroid = if footprint.is_empty() {
            self.position
        } else {
            sum / footprint.len() as f32
        };
    }

    /// Samples occupancy and efficacy over the footprint for every receptor with at least one
    /// binding.
    pub fn update_receptor_state(&mut self, env: &Environment, cell_type: &CellType) {
        let geometry = env.geometry();
        self.sensed.resize(cell_type.receptors.len(), ReceptorState::default());

        for (state, receptor) in self.sensed.iter_mut().zip(&cell_type.receptors) {
            state.weight = receptor.weight;
            if receptor.bindings.is_empty() || self.footprint.is_empty() {
                state.occupancy = 0.0;
                state.activity = 0.0;
                state.difference = Vec2::zero();
                continue;
            }
            let mut occupied = 0.0f32;
            let mut total = 0.0f32;
            let mut moment = Vec2::zero();
            for &idx in &self.footprint {
                let bound =
                    kinetics::bound_fractions(&receptor.bindings, |ligand| env.concentration_index(ligand, idx));
                occupied += bound.occupancy;
                total += bound.efficacy;
                moment += (geometry.point_position(idx) - self.centroid) * bound.efficacy;
            }
            let n = self.footprint.len() as f32;
            state.occupancy = occupied / n;
            state.activity = total / n;
            state.difference = moment / n;
        }
        self.receptors.clone_from(&self.sensed);
    }

    /// Runs the value-modifier handoff: every component sees the sensed base value and the
    /// result of the components before it.
    fn apply_modifiers(&mut self, cell_type: &CellType) {
        let components = &cell_type.components;
        for r in 0..self.sensed.len() {
            let base = self.sensed[r];
            let mut weight = base.weight;
            let mut activity = base.activity;
            let mut difference = base.difference;
            for component in components {
                weight = component.modify_weight(self, r, base.weight, weight);
                activity = component.modify_activity(self, r, base.activity, activity);
                difference = component.modify_difference(self, r, base.difference, difference);
            }
            self.receptors[r] = ReceptorState { weight, occupancy: base.occupancy, activity, difference };
        }

        let mut speed = self.base_speed;
        for component in components {
            speed = component.modify_speed(self, self.base_speed, speed);
        }
        self.speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };

        let mut color = cell_type.color;
        for component in components {
            color = component.modify_color(self, cell_type.color, color);
        }
        self.color = color;
    }

    /// EarlyUpdate: refresh footprint and receptor state, then the components' early hooks.
    pub fn early_update(&mut self, cell_type: &CellType, ctx: &TickContext<'_>) -> SimResult<()> {
        self.update_local_footprint(ctx.env);
        self.update_receptor_state(ctx.env, cell_type);
        for (slot, component) in cell_type.components.iter().enumerate() {
            component
                .early_update(self, slot, ctx)
                .map_err(|e| attribute(e, self.id, component.kind()))?;
        }
        Ok(())
    }

    /// Update: value modifiers, then each component's update hook in list order.
    pub fn update(&mut self, cell_type: &CellType, ctx: &TickContext<'_>) -> SimResult<()> {
        self.apply_modifiers(cell_type);
        for (slot, component) in cell_type.components.iter().enumerate() {
            component
                .update(self, slot, ctx)
                .map_err(|e| attribute(e, self.id, component.kind()))?;
        }
        Ok(())
    }

    pub fn late_update(&mut self, cell_type: &CellType, ctx: &TickContext<'_>) -> SimResult<()> {
        for (slot, component) in cell_type.components.iter().enumerate() {
            component
                .late_update(self, slot, ctx)
                .map_err(|e| attribute(e, self.id, component.kind()))?;
        }
        Ok(())
    }

    /// Weight-averaged activity over all receptors; 0 when no receptor carries weight.
    pub fn mean_weighted_activity(&self) -> f32 {
        let (sum, weights) = self
            .receptors
            .iter()
            .fold((0.0f32, 0.0f32), |(s, w), r| (s + r.weight * r.activity, w + r.weight));
        if weights > 0.0 {
            sum / weights
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::CellLogic;
    use crate::field::Ligand;
    use crate::kinetics::Binding;
    use crate::model::Receptor;
    use crate::staging::Staging;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn sensing_type(components: Vec<Arc<dyn CellLogic>>) -> CellType {
        let mut cell_type = CellType::bare(0, "probe", RangeConfig::fixed(2.0), RangeConfig::fixed(6.0));
        cell_type.receptors.push(Receptor {
            name: "r".to_string(),
            weight: 2.0,
            bindings: vec![Binding { ligand: 0, kd: 1.0, efficacy: 1.0 }],
        });
        cell_type.components = components;
        cell_type
    }

    fn gradient_env() -> Environment {
        let mut env = Environment::open(40, 40, 2.0, vec![Ligand { name: "a".into(), diffusivity: 0.0 }]).unwrap();
        for y in 0..40 {
            for x in 0..40 {
                env.set_concentration(0, x, y, x as f32 * 0.05);
            }
        }
        env
    }

    #[test]
    fn footprint_counts_open_points_within_reach() {
        let env = Environment::open(50, 50, 4.0, vec![Ligand { name: "a".into(), diffusivity: 0.0 }]).unwrap();
        let cell_type = sensing_type(Vec::new());
        let mut rng = StdRng::seed_from_u64(1);
        let mut cell = Cell::new(CellId(1), &cell_type, Vec2::new(100.0, 100.0), 0.0, &mut rng);
        cell.update_local_footprint(&env);

        let mut expected = 0;
        for idx in 0..env.geometry().len() {
            if env.geometry().point_position(idx).distance(cell.position) <= 10.0 {
                expected += 1;
            }
        }
        assert_eq!(cell.footprint().len(), expected);
        assert!(cell.centroid().distance(cell.position) < 1e-4);
    }

    #[test]
    fn receptor_difference_points_up_the_gradient() {
        let env = gradient_env();
        let cell_type = sensing_type(Vec::new());
        let mut rng = StdRng::seed_from_u64(2);
        let mut cell = Cell::new(CellId(1), &cell_type, Vec2::new(40.0, 40.0), 0.0, &mut rng);
        cell.update_local_footprint(&env);
        cell.update_receptor_state(&env, &cell_type);
        let state = cell.receptor(0).unwrap();
        assert!(state.activity > 0.0 && state.activity < 1.0);
        assert!(state.occupancy >= state.activity && state.occupancy < 1.0);
        assert!(state.difference.x > 0.0);
        assert!(state.difference.y.abs() < 1e-4);
        assert!((cell.mean_weighted_activity() - state.activity).abs() < 1e-6);
    }

    struct Doubler;
    impl CellLogic for Doubler {
        fn kind(&self) -> &str {
            "doubler"
        }
        fn update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
            Ok(())
        }
        fn modify_speed(&self, _cell: &Cell, _base: f32, current: f32) -> f32 {
            current * 2.0
        }
    }

    struct AddBase;
    impl CellLogic for AddBase {
        fn kind(&self) -> &str {
            "add_base"
        }
        fn update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
            Ok(())
        }
        fn modify_speed(&self, _cell: &Cell, base: f32, current: f32) -> f32 {
            current + base
        }
    }

    struct Failing;
    impl CellLogic for Failing {
        fn kind(&self) -> &str {
            "failing"
        }
        fn update(&self, _cell: &mut Cell, _slot: usize, _ctx: &TickContext<'_>) -> SimResult<()> {
            Err(SimError::Configuration("boom".into()))
        }
    }

    fn context<'a>(env: &'a Environment, types: &'a [CellType], staging: &'a Staging) -> TickContext<'a> {
        TickContext { env, cell_types: types, staging, time: 0.0, dt: 0.1, tick: 0, seed: 0 }
    }

    #[test]
    fn modifiers_run_in_component_order() {
        let env = gradient_env();
        let staging = Staging::default();
        let types = vec![sensing_type(vec![Arc::new(Doubler), Arc::new(AddBase)])];
        let mut rng = StdRng::seed_from_u64(3);
        let mut cell = Cell::new(CellId(1), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut rng);
        cell.update(&types[0], &context(&env, &types, &staging)).expect("update");
        // (2 * 2) + 2, not (2 + 2) * 2
        assert_eq!(cell.speed(), 6.0);
        assert_eq!(cell.base_speed(), 2.0);
    }

    #[test]
    fn component_errors_become_attributed_faults() {
        let env = gradient_env();
        let staging = Staging::default();
        let types = vec![sensing_type(vec![Arc::new(Failing)])];
        let mut rng = StdRng::seed_from_u64(4);
        let mut cell = Cell::new(CellId(9), &types[0], Vec2::new(20.0, 20.0), 0.0, &mut rng);
        let err = cell.update(&types[0], &context(&env, &types, &staging)).unwrap_err();
        match err {
            SimError::RuntimeFault { cell, component, .. } => {
                assert_eq!(cell, Some(9));
                assert_eq!(component, "failing");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn extension_slots_hold_typed_state() {
        let mut ext = ExtensionState::default();
        *ext.get_or_insert_with(2, || 5u32) += 1;
        assert_eq!(ext.get::<u32>(2), Some(&6));
        assert_eq!(ext.get::<f32>(2), None);
        assert_eq!(ext.get::<u32>(0), None);
        // a different type replaces the slot
        assert_eq!(*ext.get_or_insert_with(2, || 1.5f32), 1.5);
        ext.clear(2);
        assert!(ext.get_mut::<f32>(2).is_none());
    }
}
