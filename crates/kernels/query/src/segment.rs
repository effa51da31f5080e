//! Per-caller segment allocation.
//!
//! Every caller owns one contiguous range of the shared upload buffer per
//! registrar. Segments are appended at `total_points` and kept in ascending
//! start order, so a registrar can be repacked in a single pass.

use std::ops::Range;

use indexmap::IndexMap;
use swell_foundation::{CallerId, Tick};

use crate::error::{QueryError, Result};

/// A caller's half-open range `[start, end)` in the shared point buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// First point index.
    pub start: usize,
    /// One past the last point index.
    pub end: usize,
    /// Normals requested; each occupies three probe points after the queries.
    pub normal_count: usize,
    /// Tick of the last submit that touched this segment.
    pub last_touched: Tick,
}

impl Segment {
    /// Total points in the segment, probes included.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// True for a zero-length segment.
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The segment as an index range.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Number of query points, excluding normal probes.
    pub fn point_count(&self) -> usize {
        self.len()
            .saturating_sub(self.normal_count * swell_foundation::PROBES_PER_NORMAL)
    }
}

/// Limits checked when a new segment is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentLimits {
    /// Upload buffer capacity in points.
    pub capacity: usize,
    /// Maximum distinct callers.
    pub max_callers: usize,
}

/// All callers' segments valid at one tick.
#[derive(Debug, Clone, Default)]
pub struct SegmentRegistrar {
    segments: IndexMap<CallerId, Segment>,
    total_points: usize,
}

impl SegmentRegistrar {
    /// Create an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Points in use, `[0, total_points)`.
    pub fn total_points(&self) -> usize {
        self.total_points
    }

    /// Number of registered callers.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if no caller is registered.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Look up a caller's segment.
    pub fn get(&self, caller: CallerId) -> Option<&Segment> {
        self.segments.get(&caller)
    }

    /// True if the caller has a segment.
    pub fn contains(&self, caller: CallerId) -> bool {
        self.segments.contains_key(&caller)
    }

    /// Segments in ascending start order.
    pub fn iter(&self) -> impl Iterator<Item = (CallerId, &Segment)> {
        self.segments.iter().map(|(caller, segment)| (*caller, segment))
    }

    /// Return the caller's segment, refreshing it if its shape matches, or
    /// allocate a fresh one at the end of the buffer.
    ///
    /// A segment whose length or normal count differs is dropped first.
    pub fn allocate_or_reuse(
        &mut self,
        caller: CallerId,
        len: usize,
        normal_count: usize,
        tick: Tick,
        limits: SegmentLimits,
    ) -> Result<Segment> {
        if let Some(segment) = self.segments.get_mut(&caller) {
            if segment.len() == len && segment.normal_count == normal_count {
                segment.last_touched = tick;
                return Ok(*segment);
            }
            self.remove(caller);
        }

        if len == 0 {
            return Err(QueryError::EmptyQuery);
        }
        if self.segments.len() >= limits.max_callers {
            return Err(QueryError::TooManyCallers {
                max: limits.max_callers,
            });
        }
        let available = limits.capacity.saturating_sub(self.total_points);
        if len > available {
            return Err(QueryError::capacity(len, available));
        }

        let segment = Segment {
            start: self.total_points,
            end: self.total_points + len,
            normal_count,
            last_touched: tick,
        };
        self.segments.insert(caller, segment);
        self.total_points = segment.end;
        Ok(segment)
    }

    /// Drop a caller's segment.
    ///
    /// Leaves a gap unless the segment was the last one, in which case the
    /// buffer shrinks to the new tail.
    pub fn remove(&mut self, caller: CallerId) -> Option<Segment> {
        let removed = self.segments.shift_remove(&caller)?;
        if removed.end == self.total_points {
            self.total_points = self.segments.last().map_or(0, |(_, s)| s.end);
        }
        Some(removed)
    }

    /// Drop every segment.
    pub fn clear(&mut self) {
        self.segments.clear();
        self.total_points = 0;
    }

    /// Rebuild this registrar from `previous`, keeping segments touched
    /// fewer than `staleness` ticks before `tick` and packing them densely
    /// from zero in their original order.
    ///
    /// `relocate(from, to)` is called for every segment that moves so the
    /// caller can shift point data already written for it.
    pub fn copy_forward_from<F>(
        &mut self,
        previous: &SegmentRegistrar,
        tick: Tick,
        staleness: Tick,
        mut relocate: F,
    ) where
        F: FnMut(Range<usize>, usize),
    {
        self.clear();
        for (caller, segment) in previous.iter() {
            if tick.saturating_sub(segment.last_touched) >= staleness {
                continue;
            }
            let start = self.total_points;
            if segment.start != start {
                relocate(segment.range(), start);
            }
            let moved = Segment {
                start,
                end: start + segment.len(),
                ..*segment
            };
            self.segments.insert(caller, moved);
            self.total_points = moved.end;
        }
    }

    /// True if the segments tile `[0, total_points)` exactly with no
    /// overlaps or gaps.
    pub fn is_dense(&self) -> bool {
        let mut cursor = 0;
        for segment in self.segments.values() {
            if segment.start != cursor || segment.end < segment.start {
                return false;
            }
            cursor = segment.end;
        }
        cursor == self.total_points
    }

    /// True if no two segments overlap and all lie inside `[0, total_points)`.
    pub fn is_disjoint(&self) -> bool {
        let mut cursor = 0;
        for segment in self.segments.values() {
            if segment.start < cursor || segment.end > self.total_points {
                return false;
            }
            cursor = segment.end;
        }
        true
    }
}
