//! Explicit seeding context.
//!
//! Every random decision in a run (stratified split, data-loader
//! shuffling, weight initialisation) derives from one `SeedContext`
//! passed down from the orchestrator instead of global RNG state.

use rand::{rngs::StdRng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedContext {
    seed: u64,
}

impl SeedContext {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// A fresh generator for the given stream. The same `(seed, stream)`
    /// pair always yields the same sequence, and different streams do
    /// not share state.
    pub fn rng(&self, stream: u64) -> StdRng {
        StdRng::seed_from_u64(self.seed ^ stream.wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Seed for Burn's data-loader shuffling.
    pub fn shuffle_seed(&self) -> u64 {
        self.seed
    }
}

/// Stream ids, one per consumer.
pub mod streams {
    pub const SPLIT: u64 = 0;
}
