//! Deterministic PRNG for sensor models.
//!
//! Uses the SplitMix64 algorithm: fast, 8 bytes of state, and trivially
//! reproducible. Sensor values are drawn from a stream keyed by
//! (seed, component id, tick), so a reading depends only on those three
//! inputs and never on how many ticks either runtime has executed before.

use crate::fixed::Fixed64;
use crate::id::ComponentId;
use crate::sim::StateHash;

/// SplitMix64 pseudo-random number generator.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// The stream for one component's sample at one tick.
    pub fn for_sample(seed: u64, component: &ComponentId, tick: u64) -> Self {
        let mut h = StateHash::new();
        h.write_u64(seed);
        h.write(component.as_str().as_bytes());
        h.write_u64(tick);
        Self::new(h.finish())
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in [0, 1).
    pub fn next_unit(&mut self) -> Fixed64 {
        // Upper 32 bits become the fraction of a Q32.32 value with integer part 0.
        Fixed64::from_bits((self.next_u64() >> 32) as i64)
    }

    /// Uniform value in [lo, hi).
    pub fn range(&mut self, lo: Fixed64, hi: Fixed64) -> Fixed64 {
        lo + (hi - lo) * self.next_unit()
    }

    /// Returns `true` with the given probability.
    ///
    /// - probability <= 0 always returns false
    /// - probability >= 1 always returns true
    pub fn chance(&mut self, probability: Fixed64) -> bool {
        if probability <= Fixed64::ZERO {
            return false;
        }
        if probability >= Fixed64::from_num(1) {
            return true;
        }
        self.next_unit() < probability
    }
}
