use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Order of a reaction rate term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionOrder {
    /// Constant rate, uM/min.
    Zeroth,
    /// Proportional to the source ligand's concentration, 1/min.
    First,
}

/// Per-point dense `(1 + L) x L` matrix of reaction rates.
///
/// Row 0 holds the zeroth-order term of each target ligand; row `1 + s` holds the first-order
/// term driven by source ligand `s`. Terms are kept in `AtomicI64` fixed point with
/// [`FRACTION_BITS`] fractional bits: integer addition is associative, so the sum of the terms
/// pushed from many threads is the same whatever order the threads ran in.
pub struct ReactionAccumulator {
    num_ligands: usize,
    stride: usize,
    terms: Vec<AtomicI64>,
    pending: AtomicBool,
}

impl ReactionAccumulator {
    pub fn new(num_points: usize, num_ligands: usize) -> Self {
        let stride = (1 + num_ligands) * num_ligands;
        Self {
            num_ligands,
            stride,
            terms: (0..num_points * stride).map(|_| AtomicI64::new(0)).collect(),
            pending: AtomicBool::new(false),
        }
    }

    /// Number of f32 slots per grid point.
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline(always)]
    fn slot(&self, point: usize, order: ReactionOrder, target: usize, source: usize) -> usize {
        let row = match order {
            ReactionOrder::Zeroth => 0,
            ReactionOrder::First => 1 + source,
        };
        point * self.stride + row * self.num_ligands + target
    }

    /// Adds `rate` to one term. Safe to call concurrently from many cells.
    pub fn push(&self, point: usize, order: ReactionOrder, target: usize, source: usize, rate: f32) {
        if rate == 0.0 || !rate.is_finite() {
            return;
        }
        if target >= self.num_ligands || source >= self.num_ligands {
            log::warn!("Reaction term for ligand {}<-{} ignored: only {} ligands.", target, source, self.num_ligands);
            return;
        }
        let slot = self.slot(point, order, target, source);
        let Some(cell) = self.terms.get(slot) else {
            log::warn!("Reaction term pushed at point {} outside the grid ignored.", point);
            return;
        };
        let delta = to_fixed(rate);
        // Saturating so an absurd rate clamps instead of wrapping sign.
        let _ = cell.fetch_update(Ordering::AcqRel, Ordering::Relaxed, |v| Some(v.saturating_add(delta)));
        self.pending.store(true, Ordering::Release);
    }

    /// Current value of one term.
    pub fn get(&self, point: usize, order: ReactionOrder, target: usize, source: usize) -> f32 {
        self.terms
            .get(self.slot(point, order, target, source))
            .map(|a| from_fixed(a.load(Ordering::Acquire)))
            .unwrap_or(0.0)
    }

    /// True if anything was pushed since the last drain.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Moves all terms into `out` (resized to match) and clears the accumulator.
    pub fn drain_into(&mut self, out: &mut Vec<f32>) {
        out.resize(self.terms.len(), 0.0);
        out.par_iter_mut()
            .zip(self.terms.par_iter_mut())
            .for_each(|(dst, term)| {
                *dst = from_fixed(*term.get_mut());
                *term.get_mut() = 0;
            });
        *self.pending.get_mut() = false;
    }
}

/// Fractional bits of the fixed-point terms: resolution ~2.3e-10, range ~±2.1e9.
pub const FRACTION_BITS: u32 = 32;
const SCALE: f64 = (1u64 << FRACTION_BITS) as f64;

#[inline(always)]
fn to_fixed(value: f32) -> i64 {
    // `as` saturates at the i64 bounds.
    (value as f64 * SCALE).round() as i64
}

#[inline(always)]
fn from_fixed(value: i64) -> f32 {
    (value as f64 / SCALE) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_accumulate_per_slot() {
        let acc = ReactionAccumulator::new(4, 2);
        acc.push(1, ReactionOrder::Zeroth, 0, 0, 1.5);
        acc.push(1, ReactionOrder::Zeroth, 0, 0, 0.5);
        acc.push(1, ReactionOrder::First, 1, 0, -0.25);
        assert_eq!(acc.get(1, ReactionOrder::Zeroth, 0, 0), 2.0);
        assert_eq!(acc.get(1, ReactionOrder::First, 1, 0), -0.25);
        assert_eq!(acc.get(1, ReactionOrder::First, 1, 1), 0.0);
        assert_eq!(acc.get(2, ReactionOrder::Zeroth, 0, 0), 0.0);
        assert!(acc.has_pending());
    }

    #[test]
    fn concurrent_pushes_are_not_lost() {
        let acc = ReactionAccumulator::new(1, 1);
        (0..10_000).into_par_iter().for_each(|_| acc.push(0, ReactionOrder::Zeroth, 0, 0, 1.0));
        assert_eq!(acc.get(0, ReactionOrder::Zeroth, 0, 0), 10_000.0);
    }

    #[test]
    fn sums_do_not_depend_on_push_order() {
        let rates: Vec<f32> = (0..2000).map(|i| ((i * 7919) % 1000) as f32 * 1.37e-3 - 0.4).collect();
        let forward = ReactionAccumulator::new(1, 1);
        rates.iter().for_each(|&r| forward.push(0, ReactionOrder::Zeroth, 0, 0, r));
        let backward = ReactionAccumulator::new(1, 1);
        rates.iter().rev().for_each(|&r| backward.push(0, ReactionOrder::Zeroth, 0, 0, r));
        let parallel = ReactionAccumulator::new(1, 1);
        rates.par_iter().for_each(|&r| parallel.push(0, ReactionOrder::Zeroth, 0, 0, r));

        let expected = forward.get(0, ReactionOrder::Zeroth, 0, 0).to_bits();
        assert_eq!(backward.get(0, ReactionOrder::Zeroth, 0, 0).to_bits(), expected);
        assert_eq!(parallel.get(0, ReactionOrder::Zeroth, 0, 0).to_bits(), expected);
    }

    #[test]
    fn drain_clears_terms() {
        let mut acc = ReactionAccumulator::new(2, 1);
        acc.push(0, ReactionOrder::First, 0, 0, 3.0);
        let mut out = Vec::new();
        acc.drain_into(&mut out);
        assert_eq!(out.len(), 2 * acc.stride());
        assert_eq!(out[1], 3.0);
        assert!(!acc.has_pending());
        assert_eq!(acc.get(0, ReactionOrder::First, 0, 0), 0.0);
    }
}
