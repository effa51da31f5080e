//! Caller identities.
//!
//! Every query stream is keyed by an opaque integer supplied by the caller.
//! Uniqueness is the caller's responsibility; two live streams sharing one
//! key will overwrite each other's segment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::stable_hash::fnv1a64_str;

/// Opaque key identifying one logical query stream.
///
/// Typically derived from the identity of the object issuing queries, and
/// stable for as long as that object keeps querying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(pub u64);

impl CallerId {
    /// Creates a caller id from a raw key.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derives a stable caller id from a label (FNV-1a 64).
    ///
    /// Useful when callers are named rather than addressed, e.g.
    /// `"boat.hull.port"`. The same label always yields the same id.
    pub fn from_label(label: &str) -> Self {
        Self(fnv1a64_str(label))
    }

    /// Returns the raw key.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "caller#{:016x}", self.0)
    }
}

impl From<u64> for CallerId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<u32> for CallerId {
    fn from(raw: u32) -> Self {
        Self(raw as u64)
    }
}
