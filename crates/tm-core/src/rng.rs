//! Deterministic per-vehicle RNG.
//!
//! # Determinism strategy
//!
//! Each registered vehicle gets its own independent `SmallRng` seeded by:
//!
//!   seed = global_seed XOR (actor_id * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive actor IDs uniformly across the seed space.
//! This means:
//!
//! - Vehicles never share RNG state, so per-vehicle decisions (lane-change
//!   dice, run-light dice) do not depend on iteration order within a stage.
//! - Registering or unregistering one vehicle does not disturb the random
//!   streams of the others — runs stay reproducible as traffic churns.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::ActorId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Per-vehicle deterministic RNG.
///
/// Stored alongside the other per-vehicle tables and re-created whenever the
/// global seed changes.  `!Sync` by construction, so parallel stage loops
/// must hand each worker its own exclusive reference.
pub struct ActorRng(SmallRng);

impl ActorRng {
    /// Seed deterministically from the run's global seed and an actor ID.
    pub fn new(global_seed: u64, actor: ActorId) -> Self {
        let seed = global_seed ^ actor.0.wrapping_mul(MIXING_CONSTANT);
        ActorRng(SmallRng::seed_from_u64(seed))
    }

    /// Uniform sample in `[0, 100)` — the unit every behavioral percentage
    /// knob is compared against.
    #[inline]
    pub fn next_percentage(&mut self) -> f32 {
        self.0.gen_range(0.0f32..100.0)
    }

    /// Generate a value uniformly in `range`.
    #[inline]
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: rand::distributions::uniform::SampleUniform,
        R: rand::distributions::uniform::SampleRange<T>,
    {
        self.0.gen_range(range)
    }

    /// `true` with probability `p` (clamped to [0, 1]).
    #[inline]
    pub fn gen_bool(&mut self, p: f64) -> bool {
        self.0.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Choose a random element from a slice; `None` if the slice is empty.
    #[inline]
    pub fn choose<'a, T>(&mut self, slice: &'a [T]) -> Option<&'a T> {
        use rand::seq::SliceRandom;
        slice.choose(&mut self.0)
    }
}
