//! Built-in region rules.

use super::{ComponentScope, Params, RegionRule, RegionSetup, Registry, TickContext};
use crate::error::SimResult;
use crate::events::LifecycleEvent;
use crate::field::{PointFlags, ReactionOrder};
use crate::layout::Region;
use log::{debug, warn};
use rand::seq::SliceRandom;

pub fn register_builtins(registry: &mut Registry) {
    registry.register_rule("reservoir", Reservoir::build);
    registry.register_rule("wall", Wall::build);
    registry.register_rule("seed", Seed::build);
    registry.register_rule("feed", Feed::build);
}

/// Holds a ligand at a constant concentration over the region (FIXED points).
#[derive(Debug)]
pub struct Reservoir {
    ligand: usize,
    concentration_um: f32,
}

impl Reservoir {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Box<dyn RegionRule>> {
        Ok(Box::new(Self {
            ligand: scope.ligand(params.str("ligand")?)?,
            concentration_um: params.f32("concentration_um")?.max(0.0),
        }))
    }
}

impl RegionRule for Reservoir {
    fn kind(&self) -> &str {
        "reservoir"
    }

    fn init(&mut self, setup: &mut RegionSetup<'_>, region: &Region) -> SimResult<()> {
        for &idx in region.points.iter() {
            setup.env.set_flag_index(idx, PointFlags::FIXED, true);
            setup.env.set_concentration_index(self.ligand, idx, self.concentration_um);
        }
        debug!(
            "Reservoir on region {}: {} points at {} uM.",
            region.id,
            region.len(),
            self.concentration_um
        );
        Ok(())
    }
}

/// Blocks cell movement over the region; diffusion is unaffected.
#[derive(Debug)]
pub struct Wall;

impl Wall {
    fn build(_params: &Params<'_>, _scope: &ComponentScope<'_>) -> SimResult<Box<dyn RegionRule>> {
        Ok(Box::new(Self))
    }
}

impl RegionRule for Wall {
    fn kind(&self) -> &str {
        "wall"
    }

    fn init(&mut self, setup: &mut RegionSetup<'_>, region: &Region) -> SimResult<()> {
        for &idx in region.points.iter() {
            setup.env.set_flag_index(idx, PointFlags::BLOCK, true);
        }
        Ok(())
    }
}

/// Marks the region as a staging area and seeds `count` cells at random points in it.
#[derive(Debug)]
pub struct Seed {
    cell_type: usize,
    count: u32,
}

impl Seed {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Box<dyn RegionRule>> {
        Ok(Box::new(Self {
            cell_type: scope.cell_type(params.str("cell_type")?)?,
            count: params.u32_or("count", 1)?,
        }))
    }
}

impl RegionRule for Seed {
    fn kind(&self) -> &str {
        "seed"
    }

    fn init(&mut self, setup: &mut RegionSetup<'_>, region: &Region) -> SimResult<()> {
        for &idx in region.points.iter() {
            setup.env.set_flag_index(idx, PointFlags::STAGE, true);
        }

        let geometry = *setup.env.geometry();
        let mut candidates: Vec<usize> = region
            .points
            .iter()
            .copied()
            .filter(|&idx| setup.env.can_enter(geometry.point_position(idx)))
            .collect();
        candidates.shuffle(setup.rng);

        let wanted = self.count as usize;
        if candidates.len() < wanted {
            warn!(
                "Seed region {} has room for {} of {} cells.",
                region.id,
                candidates.len(),
                wanted
            );
        }
        for &idx in candidates.iter().take(wanted) {
            setup
                .staging
                .add_cell(None, self.cell_type, geometry.point_position(idx), LifecycleEvent::JustAppeared);
        }
        Ok(())
    }
}

/// Every tick, feeds a ligand at `feed_rate` (uM/min) and removes it at `kill_rate` (1/min).
#[derive(Debug)]
pub struct Feed {
    ligand: usize,
    feed_rate: f32,
    kill_rate: f32,
}

impl Feed {
    fn build(params: &Params<'_>, scope: &ComponentScope<'_>) -> SimResult<Box<dyn RegionRule>> {
        Ok(Box::new(Self {
            ligand: scope.ligand(params.str("ligand")?)?,
            feed_rate: params.f32_or("feed_rate", 0.0)?,
            kill_rate: params.f32_or("kill_rate", 0.0)?.max(0.0),
        }))
    }
}

impl RegionRule for Feed {
    fn kind(&self) -> &str {
        "feed"
    }

    fn tick_active(&self) -> bool {
        true
    }

    fn init(&mut self, _setup: &mut RegionSetup<'_>, _region: &Region) -> SimResult<()> {
        Ok(())
    }

    fn tick(&self, ctx: &TickContext<'_>, region: &Region) -> SimResult<()> {
        for &idx in region.points.iter() {
            if self.feed_rate != 0.0 {
                ctx.env
                    .push_reaction_index(idx, self.feed_rate, ReactionOrder::Zeroth, self.ligand, self.ligand);
            }
            if self.kill_rate > 0.0 {
                ctx.env
                    .push_reaction_index(idx, -self.kill_rate, ReactionOrder::First, self.ligand, self.ligand);
            }
        }
        Ok(())
    }
}
