//! Deterministic seeding.
//!
//! - RngStream: the reproducible PRNG (ChaCha8) behind reset perturbations
//!   and random baselines
//! - SeedSequence: expands a root seed into per-environment sub-seeds

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Default RNG stream used across the crate.
pub type RngStream = ChaCha8Rng;

/// SplitMix64 expansion of a 64-bit root seed into a sequence of sub-seeds.
#[derive(Clone, Debug)]
pub struct SeedSequence {
    state: u128,
}

impl SeedSequence {
    pub fn new(seed: u64) -> Self {
        // SplitMix64 golden-ratio increment for the initial state.
        let init = (seed as u128) ^ 0x9E3779B97F4A7C15u128;
        Self { state: init }
    }

    /// Generate the next sub-seed deterministically.
    pub fn next_subseed(&mut self) -> u64 {
        let mut z = (self.state as u64).wrapping_add(0x9E3779B97F4A7C15);
        self.state = (self.state ^ (z as u128)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Produce `n` sub-seeds.
    pub fn split_n(&mut self, n: usize) -> Vec<u64> {
        (0..n).map(|_| self.next_subseed()).collect()
    }
}

/// Create a new RNG stream from a seed.
pub fn rng_from_seed(seed: u64) -> RngStream {
    RngStream::seed_from_u64(seed)
}
