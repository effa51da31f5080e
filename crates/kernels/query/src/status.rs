//! Per-query status flags.
//!
//! A query reports every failure it hit at once, so statuses are bit flags
//! combined with `|`. [`QueryStatus::OK`] is the empty set.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit set of failures observed while servicing one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct QueryStatus(u32);

impl QueryStatus {
    /// Everything succeeded.
    pub const OK: Self = Self(0);
    /// No result data exists for the caller yet.
    pub const RETRIEVE_FAILED: Self = Self(1 << 0);
    /// Registering or uploading the query failed.
    pub const POST_FAILED: Self = Self(1 << 1);
    /// Fewer than two timestamped result snapshots cover the caller.
    pub const NOT_ENOUGH_DATA_FOR_VELS: Self = Self(1 << 2);
    /// The caller's segment changed shape between snapshots.
    pub const VELOCITY_DATA_INVALIDATED: Self = Self(1 << 3);
    /// The snapshots are too close in time to difference.
    pub const INVALID_DT_FOR_VELOCITY: Self = Self(1 << 4);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::RETRIEVE_FAILED, "RETRIEVE_FAILED"),
        (Self::POST_FAILED, "POST_FAILED"),
        (Self::NOT_ENOUGH_DATA_FOR_VELS, "NOT_ENOUGH_DATA_FOR_VELS"),
        (Self::VELOCITY_DATA_INVALIDATED, "VELOCITY_DATA_INVALIDATED"),
        (Self::INVALID_DT_FOR_VELOCITY, "INVALID_DT_FOR_VELOCITY"),
    ];

    /// Raw flag bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True if no flag is set.
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// True if every flag in `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True unless the retrieve step failed.
    ///
    /// Velocity flags do not affect this; position data is still valid.
    pub const fn retrieve_succeeded(self) -> bool {
        !self.contains(Self::RETRIEVE_FAILED)
    }
}

impl BitOr for QueryStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for QueryStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return f.write_str("OK");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    f.write_str(" | ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
