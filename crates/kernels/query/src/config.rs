//! Query engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Capacities and thresholds for a [`QueryEngine`](crate::QueryEngine).
///
/// Capacities are fixed at construction; the engine never grows its
/// buffers mid-tick. Size them from the expected peak query load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryEngineConfig {
    /// Shared upload buffer capacity in points (normal probes included).
    pub max_query_count: usize,
    /// Maximum distinct callers per registrar.
    pub max_callers: usize,
    /// Maximum outstanding batches before the oldest is evicted.
    pub max_in_flight_requests: usize,
    /// Ring slots held beyond the in-flight bound and the current slot.
    pub extra_held_snapshots: usize,
    /// Registrations untouched for this many ticks are not carried forward.
    pub staleness_ticks: u64,
    /// Smallest snapshot spacing (seconds) velocities are computed over.
    pub min_velocity_dt: f64,
    /// Base height added to displacement `y` when reporting heights.
    pub sea_level: f32,
    /// Suppress the ring-exhaustion error (editor or paused hosts).
    pub quiet_exhaustion: bool,
}

impl QueryEngineConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.max_query_count == 0 {
            return Err(QueryError::InvalidConfig(
                "max_query_count must be > 0".to_string(),
            ));
        }
        if self.max_callers == 0 {
            return Err(QueryError::InvalidConfig(
                "max_callers must be > 0".to_string(),
            ));
        }
        if self.max_in_flight_requests == 0 {
            return Err(QueryError::InvalidConfig(
                "max_in_flight_requests must be > 0".to_string(),
            ));
        }
        if self.staleness_ticks == 0 {
            return Err(QueryError::InvalidConfig(
                "staleness_ticks must be > 0".to_string(),
            ));
        }
        if !self.min_velocity_dt.is_finite() || self.min_velocity_dt < 0.0 {
            return Err(QueryError::InvalidConfig(format!(
                "min_velocity_dt must be finite and >= 0, got {}",
                self.min_velocity_dt
            )));
        }
        if !self.sea_level.is_finite() {
            return Err(QueryError::InvalidConfig(
                "sea_level must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of registrar slots in the ring buffer.
    pub fn ring_capacity(&self) -> usize {
        self.max_in_flight_requests + self.extra_held_snapshots + 1
    }
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self {
            max_query_count: 4096,
            max_callers: 1024,
            max_in_flight_requests: 7,
            extra_held_snapshots: 2,
            staleness_ticks: 10,
            min_velocity_dt: 1e-4,
            sea_level: 0.0,
            quiet_exhaustion: false,
        }
    }
}
