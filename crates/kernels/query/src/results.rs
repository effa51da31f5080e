//! Accepted result snapshots.
//!
//! Two snapshots are retained so velocities can be differenced. Accepting
//! a new one moves `current` into `previous`; nothing is ever partially
//! overwritten.

use glam::Vec3;
use swell_foundation::{CallerId, Time};

use crate::segment::{Segment, SegmentRegistrar};

/// Which part of a caller's segment to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultField {
    /// One value per query point.
    Points,
    /// Three values per requested normal.
    NormalProbes,
    /// The whole segment.
    All,
}

/// Sampled values for one completed batch with the registrar that laid
/// them out.
#[derive(Debug, Clone)]
pub struct ResultSnapshot {
    values: Vec<Vec3>,
    registrar: SegmentRegistrar,
    timestamp: Time,
}

impl ResultSnapshot {
    /// Create a snapshot.
    pub fn new(values: Vec<Vec3>, registrar: SegmentRegistrar, timestamp: Time) -> Self {
        Self {
            values,
            registrar,
            timestamp,
        }
    }

    /// Raw values, one per uploaded point.
    pub fn values(&self) -> &[Vec3] {
        &self.values
    }

    /// Segment layout of the batch.
    pub fn registrar(&self) -> &SegmentRegistrar {
        &self.registrar
    }

    /// Field time the batch sampled.
    pub fn timestamp(&self) -> Time {
        self.timestamp
    }

    /// A caller's segment in this snapshot.
    pub fn segment(&self, caller: CallerId) -> Option<&Segment> {
        self.registrar.get(caller)
    }

    /// View of a caller's values.
    pub fn slice(&self, caller: CallerId, field: ResultField) -> Option<&[Vec3]> {
        let segment = self.registrar.get(caller)?;
        let values = self.values.get(segment.range())?;
        let split = segment.point_count().min(values.len());
        Some(match field {
            ResultField::Points => &values[..split],
            ResultField::NormalProbes => &values[split..],
            ResultField::All => values,
        })
    }
}

/// The current and previous accepted snapshots.
#[derive(Debug, Clone, Default)]
pub struct ResultStore {
    current: Option<ResultSnapshot>,
    previous: Option<ResultSnapshot>,
}

impl ResultStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `snapshot` current, keeping the old current as previous.
    pub fn accept(&mut self, snapshot: ResultSnapshot) {
        self.previous = self.current.replace(snapshot);
    }

    /// The most recently accepted snapshot.
    pub fn current(&self) -> Option<&ResultSnapshot> {
        self.current.as_ref()
    }

    /// The snapshot accepted before `current`.
    pub fn previous(&self) -> Option<&ResultSnapshot> {
        self.previous.as_ref()
    }

    /// View of a caller's values in the current snapshot.
    ///
    /// `None` until a batch containing the caller has been accepted.
    pub fn retrieve(&self, caller: CallerId, field: ResultField) -> Option<&[Vec3]> {
        self.current.as_ref()?.slice(caller, field)
    }

    /// Callers with data in the current snapshot.
    pub fn caller_count(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.registrar.len())
    }

    /// Drop both snapshots.
    pub fn clear(&mut self) {
        self.current = None;
        self.previous = None;
    }
}
