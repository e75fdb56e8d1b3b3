//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StageRng instances derived
//! from the single master seed in ChurnConfig.
//!
//! Each pipeline stage gets its own RNG stream, seeded deterministically
//! from (master_seed XOR stage_index). This means:
//!   - Adding a new stage never changes existing stages' streams.
//!   - Each stage's stream is fully reproducible in isolation.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single pipeline stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// Create a stage RNG from the master seed and a stable
    /// stage index. The index must never change once assigned.
    pub fn new(master_seed: u64, stage_index: u64) -> Self {
        let derived_seed = master_seed ^ (stage_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
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
        use rand::RngCore;
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a usize in [0, n).
    pub fn next_below(&mut self, n: usize) -> usize {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        (self.inner.next_u64() % n as u64) as usize
    }

    /// In-place Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }

    /// Draw `k` distinct indices from `0..n` (partial Fisher-Yates).
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let mut pool: Vec<usize> = (0..n).collect();
        let k = k.min(n);
        for i in 0..k {
            let j = i + self.next_below(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }
}

/// All stage RNGs for a single run, indexed by stable slot.
#[derive(Debug, Clone, Copy)]
pub struct RngBank {
    master_seed: u64,
}

impl RngBank {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        StageRng::new(self.master_seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stage slot assignments.
/// NEVER reorder or remove entries; only append.
/// Reordering changes every stage's seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Split = 0,
    Forest = 1,
    CrossValidation = 2,
    // Add new stages here (append only).
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Forest => "forest",
            Self::CrossValidation => "cross_validation",
        }
    }
}
