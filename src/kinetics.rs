//! Receptor-ligand binding kinetics: competitive equilibrium occupancy and efficacy.
//!
//! For the ligands `i` bound by one receptor, with concentration `c_i`, dissociation constant
//! `kD_i` and efficacy `e_i`:
//!
//! ```text
//! occupancy = sum(c_i / kD_i)       / (1 + sum(c_i / kD_i))
//! efficacy  = sum(c_i / kD_i * e_i) / (1 + sum(c_i / kD_i))
//! ```
//!
//! Both stay in [0, 1] for non-negative concentrations, positive `kD` and `e_i` in [0, 1].

use serde::{Deserialize, Serialize};

/// Affinity of a receptor for one ligand.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Ligand index in the environment.
    pub ligand: usize,
    /// Dissociation constant, uM.
    pub kd: f32,
    /// Signalling potency, 0..=1.
    pub efficacy: f32,
}

/// Bound fractions of one receptor at one point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundFractions {
    /// Fraction of the receptor population bound by any ligand.
    pub occupancy: f32,
    /// Occupancy weighted by each ligand's signalling potency.
    pub efficacy: f32,
}

/// Competitive-equilibrium occupancy and efficacy for `bindings`, reading each ligand's
/// concentration through `concentration`.
#[inline(always)]
pub fn bound_fractions<F>(bindings: &[Binding], concentration: F) -> BoundFractions
where
    F: Fn(usize) -> f32,
{
    let (occ, eff) = bindings.iter().fold((0.0f32, 0.0f32), |(occ, eff), b| {
        let ratio = concentration(b.ligand).max(0.0) / b.kd;
        (occ + ratio, eff + ratio * b.efficacy)
    });
    BoundFractions { occupancy: occ / (1.0 + occ), efficacy: eff / (1.0 + occ) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(ligand: usize, kd: f32, efficacy: f32) -> Binding {
        Binding { ligand, kd, efficacy }
    }

    fn occupancy<F: Fn(usize) -> f32>(bindings: &[Binding], conc: F) -> f32 {
        bound_fractions(bindings, conc).occupancy
    }

    fn efficacy<F: Fn(usize) -> f32>(bindings: &[Binding], conc: F) -> f32 {
        bound_fractions(bindings, conc).efficacy
    }

    #[test]
    fn half_occupancy_at_kd() {
        let b = [binding(0, 0.3, 1.0)];
        assert!((occupancy(&b, |_| 0.3) - 0.5).abs() < 1e-6);
        assert!((efficacy(&b, |_| 0.3) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn matches_single_ligand_formula() {
        let b = [binding(0, 2.0, 1.0)];
        for c in [0.0, 0.1, 1.0, 5.0, 100.0] {
            assert!((occupancy(&b, |_| c) - c / (c + 2.0)).abs() < 1e-6);
        }
    }

    #[test]
    fn bounded_for_any_non_negative_input() {
        let b = [binding(0, 0.01, 1.0), binding(1, 5.0, 0.2), binding(2, 1e-6, 0.7)];
        for scale in [0.0f32, 1e-3, 1.0, 1e3, 1e9] {
            let conc = |l: usize| scale * (l as f32 + 1.0);
            let occ = occupancy(&b, conc);
            let eff = efficacy(&b, conc);
            assert!((0.0..=1.0).contains(&occ), "occupancy {}", occ);
            assert!((0.0..=1.0).contains(&eff), "efficacy {}", eff);
            assert!(eff <= occ + 1e-6);
        }
        // negative concentrations are treated as zero
        assert_eq!(occupancy(&b, |_| -4.0), 0.0);
    }

    #[test]
    fn competing_ligands_share_the_receptor() {
        let agonist = binding(0, 1.0, 1.0);
        let antagonist = binding(1, 1.0, 0.0);
        let alone = efficacy(&[agonist], |_| 1.0);
        let competed = efficacy(&[agonist, antagonist], |_| 1.0);
        assert!((alone - 0.5).abs() < 1e-6);
        assert!((competed - 1.0 / 3.0).abs() < 1e-6);
        assert!((occupancy(&[agonist, antagonist], |_| 1.0) - 2.0 / 3.0).abs() < 1e-6);
    }
}
