//! Deterministic random streams.
//!
//! Used by the soak driver and churn tests so that a given seed always
//! replays the same sequence of caller arrivals, departures and point
//! counts.
//!
//! # PRNG Algorithm
//!
//! SplitMix64: fast, portable, and good enough for workload generation.

use crate::stable_hash::fnv1a64_str;

/// A deterministic pseudo-random number stream.
///
/// Each call to a generation method advances the stream state. Streams
/// never reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngStream {
    state: u64,
}

impl RngStream {
    /// Create a new RNG stream from a seed.
    #[inline]
    pub const fn new(seed: u64) -> Self {
        // SplitMix64 needs a non-zero state
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state }
    }

    /// Create a new RNG stream from a string label.
    #[inline]
    pub fn from_label(label: &str) -> Self {
        Self::new(fnv1a64_str(label))
    }

    /// Create a stream by combining a parent seed with a label.
    ///
    /// ```ignore
    /// let arrivals = RngStream::derive(seed, "churn.arrivals");
    /// ```
    #[inline]
    pub fn derive(parent_seed: u64, label: &str) -> Self {
        let label_hash = fnv1a64_str(label);
        Self::new(splitmix64_mix(parent_seed ^ label_hash))
    }

    /// Get the current internal state (for debugging/testing).
    #[inline]
    pub const fn state(&self) -> u64 {
        self.state
    }

    /// Generate the next random u64 value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = splitmix64_next(self.state);
        splitmix64_mix(self.state)
    }

    /// Generate a uniform random f64 in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        u64_to_f64_01(self.next_u64())
    }

    /// Generate a uniform random f64 in [min, max).
    #[inline]
    pub fn uniform_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.uniform() * (max - min)
    }

    /// Generate a random boolean with given probability of being true.
    #[inline]
    pub fn bool_with_prob(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }

    /// Generate a random integer in [min, max] (inclusive).
    #[inline]
    pub fn int_range(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        let range = (max - min + 1) as u64;
        min + (self.next_u64() % range) as i64
    }

    /// Generate a random index in [0, len). Returns 0 for an empty range.
    #[inline]
    pub fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (self.next_u64() % len as u64) as usize
    }
}

#[inline]
const fn splitmix64_next(state: u64) -> u64 {
    state.wrapping_add(0x9E3779B97F4A7C15)
}

#[inline]
const fn splitmix64_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Upper 53 bits to a uniform f64 in [0, 1).
#[inline]
const fn u64_to_f64_01(x: u64) -> f64 {
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}
