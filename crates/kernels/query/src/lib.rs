//! Swell Query
//!
//! Batched asynchronous point queries against a displaced surface field.
//!
//! Many independent callers submit variable-length point sets every tick.
//! The engine packs them into one upload buffer, hands it to a
//! [`BatchExecutor`] whose results arrive several ticks later, and maps
//! the delayed results back to whoever asked, even though the set of
//! callers has changed in the meantime.
//!
//! # Pieces
//!
//! - [`SegmentRegistrar`]: caller to buffer-range map for one tick
//! - [`SegmentRegistrarRingBuffer`]: registrars kept alive for in-flight batches
//! - [`RequestQueue`]: bounded FIFO of in-flight batches
//! - [`ResultStore`]: current and previous accepted snapshots
//! - [`VelocityEstimator`]: finite differences across the two snapshots
//! - [`QueryEngine`]: façade that drives all of the above once per tick
//! - [`SampleHeightHelper`], [`SampleFlowHelper`], [`RayTraceHelper`]: one-query-per-tick wrappers
//!
//! # Example
//!
//! ```ignore
//! let exec = DeferredExecutor::new(|p, t| wave(p.position, t)).with_latency(2);
//! let mut engine = QueryEngine::new(QueryEngineConfig::default(), exec)?;
//!
//! loop {
//!     engine.submit(hull, &hull_points, true)?;
//!     engine.executor_mut().set_time(time);
//!     engine.tick(time);
//!     if let Some(result) = engine.retrieve(hull) {
//!         apply_buoyancy(&result.heights, &result.normals);
//!     }
//! }
//! ```

pub mod config;
pub mod cpu;
pub mod engine;
pub mod error;
pub mod executor;
pub mod helper;
pub mod request;
pub mod results;
pub mod ring;
pub mod segment;
pub mod status;
pub mod velocity;

pub use config::QueryEngineConfig;
pub use cpu::{DeferredExecutor, DeferredPending, FieldFn};
pub use engine::{EngineStats, QueryEngine, QueryInput, QueryOutput, QueryResult, TickOutcome};
pub use error::{ExecutorError, QueryError, Result};
pub use executor::{BatchExecutor, BatchPoll};
pub use helper::{MAX_RAY_STEPS, RayTraceHelper, SampleFlowHelper, SampleHeightHelper};
pub use request::{PendingRequest, PollOutcome, RequestQueue};
pub use results::{ResultField, ResultSnapshot, ResultStore};
pub use ring::SegmentRegistrarRingBuffer;
pub use segment::{Segment, SegmentLimits, SegmentRegistrar};
pub use status::QueryStatus;
pub use velocity::VelocityEstimator;

pub use swell_foundation::{CallerId, SamplePoint, Tick, Time, Vec3};
