//! Swell Foundation
//!
//! Core foundational utilities shared by the swell query crates.
//! Provides caller identities, stable hashing, deterministic random
//! streams, and the sample-point layout uploaded to batch executors.

pub mod ids;
pub mod rng;
pub mod sample;
pub mod stable_hash;

pub use glam::Vec3;

// Re-export ID types at crate root
pub use ids::CallerId;

pub use rng::RngStream;

pub use sample::{
    NORMAL_PROBE_OFFSET, PROBES_PER_NORMAL, SamplePoint, min_grid_size_for, normal_from_probes,
    normal_probes,
};

// Re-export stable hash items at crate root
pub use stable_hash::{
    FNV1A_OFFSET_BASIS_64, FNV1A_PRIME_64, fnv1a64, fnv1a64_mix, fnv1a64_str,
};

/// Simulation time in seconds.
///
/// Result snapshots are stamped with the field time they sampled.
pub type Time = f64;

/// Discrete update step counter.
pub type Tick = u64;
