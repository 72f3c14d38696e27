//! Reproducible randomness for one generation request.
//!
//! Every random choice the engine makes (room/slot iteration order, branching
//! tie-breaks, ILP objective perturbation) is drawn from a single stream so a
//! run can be replayed from its seed.

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Owns the pseudo-random stream of a generation request.
#[derive(Debug, Clone)]
pub struct SeedController {
    seed: u64,
    rng: StdRng,
}

impl SeedController {
    /// Uses `seed` when given, otherwise draws a fresh one.
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            let fresh = rand::random::<u64>();
            debug!("No seed supplied, drew fresh seed {}", fresh);
            fresh
        });
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// The seed that replays this stream.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    /// Random tie-break keys, one per item. Lower keys win ties.
    pub fn tie_break_keys(&mut self, count: usize) -> Vec<u64> {
        (0..count).map(|_| self.rng.random::<u64>()).collect()
    }

    /// Small positive perturbations in `[0, scale)`.
    pub fn jitter(&mut self, count: usize, scale: f64) -> Vec<f64> {
        (0..count)
            .map(|_| self.rng.random::<f64>() * scale)
            .collect()
    }
}
