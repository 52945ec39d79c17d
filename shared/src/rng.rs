//! Portable linear-congruential generator.
//!
//! Everything that must replay identically on every machine draws from
//! this generator instead of a platform RNG.

const MULTIPLIER: u32 = 1_664_525;
const INCREMENT: u32 = 1_013_904_223;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    /// Folds a 64-bit seed into the 32-bit generator state.
    pub fn new(seed: u64) -> Self {
        let folded = (seed as u32) ^ ((seed >> 32) as u32);
        Self { state: folded }
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self
            .state
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(INCREMENT);
        self.state
    }

    /// Value in `0..bound`. `bound` must be non-zero.
    pub fn next_below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound
    }

    /// In-place Fisher-Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i as u32 + 1) as usize;
            items.swap(i, j);
        }
    }
}
