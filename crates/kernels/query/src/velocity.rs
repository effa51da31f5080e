//! Finite-difference velocity between the two retained snapshots.

use glam::Vec3;
use swell_foundation::CallerId;

use crate::results::{ResultField, ResultStore};
use crate::status::QueryStatus;

/// Differences a caller's values across the current and previous snapshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VelocityEstimator {
    min_dt: f64,
}

impl VelocityEstimator {
    /// Create an estimator refusing snapshot spacings below `min_dt`.
    pub fn new(min_dt: f64) -> Self {
        Self { min_dt }
    }

    /// Write `(current - previous) / dt` for the caller's query points
    /// into `out`.
    ///
    /// At most `min(out.len(), point_count)` entries are written. `out` is
    /// untouched unless the result is [`QueryStatus::OK`].
    pub fn estimate(&self, store: &ResultStore, caller: CallerId, out: &mut [Vec3]) -> QueryStatus {
        let (Some(current), Some(previous)) = (store.current(), store.previous()) else {
            return QueryStatus::NOT_ENOUGH_DATA_FOR_VELS;
        };
        let Some(now) = current.slice(caller, ResultField::Points) else {
            return QueryStatus::RETRIEVE_FAILED;
        };
        let Some(before) = previous.slice(caller, ResultField::Points) else {
            return QueryStatus::NOT_ENOUGH_DATA_FOR_VELS;
        };
        let same_shape = matches!(
            (current.segment(caller), previous.segment(caller)),
            (Some(a), Some(b)) if a.len() == b.len() && a.normal_count == b.normal_count
        );
        if !same_shape {
            return QueryStatus::VELOCITY_DATA_INVALIDATED;
        }

        let dt = current.timestamp() - previous.timestamp();
        if dt < self.min_dt || dt <= 0.0 {
            return QueryStatus::INVALID_DT_FOR_VELOCITY;
        }

        let inv_dt = (1.0 / dt) as f32;
        for ((out, now), before) in out.iter_mut().zip(now).zip(before) {
            *out = (*now - *before) * inv_dt;
        }
        QueryStatus::OK
    }
}
