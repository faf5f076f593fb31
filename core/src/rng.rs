//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through SubsystemRng instances derived
//! from the single master seed stored on the run record.
//!
//! Each subsystem gets its own RNG stream per step, seeded from
//! (master_seed, subsystem slot, step). This means:
//!   - Adding a new subsystem never changes existing subsystems' streams.
//!   - A step's draws do not depend on how many draws earlier steps made.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::types::Step;

/// A named, deterministic RNG for a single subsystem.
pub struct SubsystemRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl SubsystemRng {
    /// Create a subsystem RNG from the master seed, a stable subsystem
    /// index and the step number. The index must never change once assigned.
    pub fn new(master_seed: u64, subsystem_index: u64, step: Step) -> Self {
        let derived_seed = master_seed
            ^ subsystem_index.wrapping_mul(0x9e37_79b9_7f4a_7c15)
            ^ step.wrapping_mul(0xbf58_476d_1ce4_e5b9);
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform sample inside the unit disc, as (east, north) offsets.
    pub fn unit_disc(&mut self) -> (f64, f64) {
        let angle = std::f64::consts::TAU * self.next_f64();
        let radius = self.next_f64().sqrt();
        (radius * angle.cos(), radius * angle.sin())
    }
}

/// All subsystem RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn for_subsystem(&self, slot: SubsystemSlot, step: Step) -> SubsystemRng {
        SubsystemRng::new(self.master_seed, slot as u64, step).with_name(slot.name())
    }
}

/// Stable subsystem slot assignments.
/// NEVER reorder or remove entries. Append only.
/// Reordering changes every subsystem's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum SubsystemSlot {
    Seeding = 0,
    Physics = 1,
    Culling = 2,
    // Add new subsystems here.
}

impl SubsystemSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Seeding => "seeding",
            Self::Physics => "physics",
            Self::Culling => "culling",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_repeat_for_same_inputs() {
        let bank = RngBank::new(7);
        let draw = |step| {
            let mut rng = bank.for_subsystem(SubsystemSlot::Seeding, step);
            (0..4).map(|_| rng.next_f64()).collect::<Vec<_>>()
        };
        assert_eq!(draw(3), draw(3));
        assert_ne!(draw(3), draw(4));
    }

    #[test]
    fn unit_disc_stays_inside() {
        let mut rng = RngBank::new(1).for_subsystem(SubsystemSlot::Seeding, 0);
        for _ in 0..1000 {
            let (x, y) = rng.unit_disc();
            assert!(x * x + y * y <= 1.0 + 1e-12);
        }
    }
}
