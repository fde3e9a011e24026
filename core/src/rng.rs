//! Deterministic random number generation.
//!
//! RULE: Nothing in the pipeline may call any platform RNG.
//! All randomness flows through StageRng instances derived
//! from the single seed stored on the PipelineConfig.
//!
//! Each stage gets its own RNG stream, seeded deterministically
//! from (seed XOR stage_index). Adding a new stage never changes
//! the streams of existing stages.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single pipeline stage.
pub struct StageRng {
    pub name: &'static str,
    inner: Pcg64Mcg,
}

impl StageRng {
    /// Create a stage RNG from the run seed and a stable stage index.
    /// The index must never change once assigned.
    pub fn new(seed: u64, stage_index: u64) -> Self {
        let derived_seed = seed ^ (stage_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: "unnamed",
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Draw a raw u64 (full range).
    pub fn next_u64(&mut self) -> u64 {
        use rand::RngCore;
        self.inner.next_u64()
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        use rand::RngCore;
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Fisher-Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_u64_below(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}

/// All stage RNGs for a single run, indexed by stable slot.
pub struct RngBank {
    seed: u64,
}

impl RngBank {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn for_stage(&self, slot: StageSlot) -> StageRng {
        StageRng::new(self.seed, slot as u64).with_name(slot.name())
    }
}

/// Stable stage slot assignments.
/// NEVER reorder or remove entries, only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum StageSlot {
    Split = 0,
    Forest = 1,
}

impl StageSlot {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Forest => "forest",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let mut a = RngBank::new(42).for_stage(StageSlot::Split);
        let mut b = RngBank::new(42).for_stage(StageSlot::Split);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn stages_get_independent_streams() {
        let bank = RngBank::new(42);
        let mut split = bank.for_stage(StageSlot::Split);
        let mut forest = bank.for_stage(StageSlot::Forest);
        assert_ne!(split.next_u64(), forest.next_u64());
        assert_eq!(forest.name, "forest");
    }

    #[test]
    fn shuffle_is_a_permutation() {
        let mut rng = RngBank::new(7).for_stage(StageSlot::Split);
        let mut items: Vec<usize> = (0..50).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
    }
}
