//! Query engine façade.
//!
//! Owns the upload buffer, the registrar ring, the request queue and the
//! result store, and drives them once per tick:
//!
//! 1. callers `submit()` point sets into the current registrar
//! 2. `tick(time)` accepts the freshest completed batch, then uploads the
//!    registrar as one batch and advances the ring
//! 3. callers `retrieve()` / `velocity()` from the accepted snapshots
//!
//! Nothing here blocks on the executor.

use glam::Vec3;
use serde::Serialize;
use swell_foundation::{
    CallerId, PROBES_PER_NORMAL, SamplePoint, Tick, Time, min_grid_size_for, normal_from_probes,
    normal_probes,
};
use tracing::{debug, error, info, instrument, warn};

use crate::config::QueryEngineConfig;
use crate::error::{QueryError, Result};
use crate::executor::BatchExecutor;
use crate::request::RequestQueue;
use crate::results::{ResultField, ResultStore};
use crate::ring::SegmentRegistrarRingBuffer;
use crate::segment::{SegmentLimits, SegmentRegistrar};
use crate::status::QueryStatus;
use crate::velocity::VelocityEstimator;

/// Points and options for one combined [`QueryEngine::query`] call.
#[derive(Debug, Clone, Copy)]
pub struct QueryInput<'a> {
    /// World-space sample positions.
    pub points: &'a [Vec3],
    /// Smallest extent the caller cares about; zero for full detail.
    pub min_spatial_length: f32,
    /// Also sample a surface normal at every point.
    pub want_normals: bool,
    /// Also difference the last two snapshots.
    pub want_velocities: bool,
}

impl<'a> QueryInput<'a> {
    /// Query `points` at full detail with no normals or velocities.
    pub fn new(points: &'a [Vec3]) -> Self {
        Self {
            points,
            min_spatial_length: 0.0,
            want_normals: false,
            want_velocities: false,
        }
    }

    /// Set the minimum spatial length.
    pub fn with_min_spatial_length(mut self, length: f32) -> Self {
        self.min_spatial_length = length;
        self
    }

    /// Request normals.
    pub fn with_normals(mut self) -> Self {
        self.want_normals = true;
        self
    }

    /// Request velocities.
    pub fn with_velocities(mut self) -> Self {
        self.want_velocities = true;
        self
    }
}

/// A caller's decoded values from the current snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Sampled displacement (or flow) per query point.
    pub displacements: Vec<Vec3>,
    /// `sea_level + displacement.y` per query point.
    pub heights: Vec<f32>,
    /// Surface normal per query point, empty unless normals were requested.
    pub normals: Vec<Vec3>,
}

impl QueryResult {
    fn clear(&mut self) {
        self.displacements.clear();
        self.heights.clear();
        self.normals.clear();
    }
}

/// Reusable output of [`QueryEngine::query`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Decoded values, empty if the retrieve failed.
    pub result: QueryResult,
    /// Per-point velocity, zero-filled when the estimate failed.
    pub velocities: Vec<Vec3>,
}

/// Lifetime counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    /// Batches handed to the executor.
    pub batches_submitted: u64,
    /// Snapshots accepted into the result store.
    pub results_accepted: u64,
    /// Requests dropped because the queue was full.
    pub requests_evicted: u64,
    /// Requests the executor reported as failed.
    pub requests_failed: u64,
    /// Completed requests skipped in favour of a fresher one.
    pub completed_discarded: u64,
    /// Ticks that could not submit because the ring was exhausted.
    pub exhausted_ticks: u64,
    /// Batches the executor refused to accept.
    pub submit_failures: u64,
}

/// What one [`QueryEngine::tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// A batch was submitted.
    pub submitted: bool,
    /// A new result snapshot was accepted.
    pub accepted: bool,
}

/// Logs a recurring condition once per episode.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogLatch {
    tripped: bool,
}

impl LogLatch {
    /// Returns `true` the first time it is called after a reset.
    pub(crate) fn trip(&mut self) -> bool {
        !std::mem::replace(&mut self.tripped, true)
    }

    pub(crate) fn reset(&mut self) {
        self.tripped = false;
    }
}

/// Batched asynchronous point-query engine.
pub struct QueryEngine<E: BatchExecutor> {
    config: QueryEngineConfig,
    executor: E,
    upload: Vec<SamplePoint>,
    ring: SegmentRegistrarRingBuffer,
    requests: RequestQueue<E::Pending>,
    results: ResultStore,
    velocity: VelocityEstimator,
    tick: Tick,
    /// The last tick could not advance the ring; new callers are refused.
    stalled: bool,
    exhaustion_latch: LogLatch,
    eviction_latch: LogLatch,
    failure_latch: LogLatch,
    stats: EngineStats,
}

impl<E: BatchExecutor> QueryEngine<E> {
    /// Create an engine over `executor`.
    ///
    /// Fails only if the configuration is invalid.
    pub fn new(config: QueryEngineConfig, executor: E) -> Result<Self> {
        config.validate()?;
        info!(
            max_query_count = config.max_query_count,
            max_callers = config.max_callers,
            max_in_flight = config.max_in_flight_requests,
            ring_capacity = config.ring_capacity(),
            "Query engine initialized"
        );
        Ok(Self {
            ring: SegmentRegistrarRingBuffer::new(config.ring_capacity()),
            requests: RequestQueue::new(config.max_in_flight_requests),
            velocity: VelocityEstimator::new(config.min_velocity_dt),
            upload: Vec::new(),
            results: ResultStore::new(),
            tick: 0,
            stalled: false,
            exhaustion_latch: LogLatch::default(),
            eviction_latch: LogLatch::default(),
            failure_latch: LogLatch::default(),
            stats: EngineStats::default(),
            config,
            executor,
        })
    }

    /// Register `points` for `caller` at full detail.
    pub fn submit(&mut self, caller: CallerId, points: &[Vec3], want_normals: bool) -> Result<()> {
        self.submit_with_detail(caller, 0.0, points, want_normals)
    }

    /// Register `points` for `caller`, sampled no finer than needed for an
    /// object of extent `min_spatial_length`.
    ///
    /// Reuses the caller's segment when the point and normal counts are
    /// unchanged. Data becomes retrievable once a batch containing it
    /// completes, typically a few ticks later.
    pub fn submit_with_detail(
        &mut self,
        caller: CallerId,
        min_spatial_length: f32,
        points: &[Vec3],
        want_normals: bool,
    ) -> Result<()> {
        if self.stalled && !self.ring.current().contains(caller) {
            return Err(QueryError::RingExhausted);
        }

        let normal_count = if want_normals { points.len() } else { 0 };
        let len = points.len() + normal_count * PROBES_PER_NORMAL;
        let limits = self.limits();
        let segment = self.ring.current_mut().allocate_or_reuse(
            caller,
            len,
            normal_count,
            self.tick,
            limits,
        )?;

        let min_grid_size = min_grid_size_for(min_spatial_length);
        let upload = self.upload_buffer();
        let Some(dst) = upload.get_mut(segment.range()) else {
            return Err(QueryError::capacity(len, 0));
        };
        let (query_dst, probe_dst) = dst.split_at_mut(points.len());
        for (slot, point) in query_dst.iter_mut().zip(points) {
            *slot = SamplePoint::new(*point, min_grid_size);
        }
        for (probes, point) in probe_dst.chunks_exact_mut(PROBES_PER_NORMAL).zip(points) {
            probes.copy_from_slice(&normal_probes(*point, min_grid_size));
        }
        Ok(())
    }

    /// Stop carrying `caller` forward. Batches already submitted still
    /// contain it.
    pub fn remove(&mut self, caller: CallerId) {
        self.ring.remove_registrations(caller);
    }

    /// Clear every registration not backing an in-flight batch. All
    /// callers must submit again.
    pub fn compact(&mut self) {
        self.ring.compact();
        debug!(tick = self.tick, "compacted registrations");
    }

    /// Accept the freshest completed batch, then submit this tick's
    /// registrations as a batch sampled at `time`.
    ///
    /// A batch that completes this tick is accepted before the queue bound
    /// can evict it.
    #[instrument(skip(self), fields(tick = self.tick))]
    pub fn tick(&mut self, time: Time) -> TickOutcome {
        let mut outcome = TickOutcome {
            accepted: self.poll_results(),
            ..Default::default()
        };

        if self.stalled && self.ring.can_acquire() {
            self.stalled = false;
            self.exhaustion_latch.reset();
            info!(tick = self.tick, "Query ring buffer recovered");
        }
        if !self.ring.current().is_empty() {
            outcome.submitted = self.submit_current(time);
        }
        self.tick += 1;
        outcome
    }

    /// Decoded values for `caller` from the current snapshot.
    pub fn retrieve(&self, caller: CallerId) -> Option<QueryResult> {
        let mut result = QueryResult::default();
        self.retrieve_into(caller, &mut result).then_some(result)
    }

    /// Decode `caller`'s values into `out`, reusing its allocations.
    ///
    /// Returns `false` and leaves `out` empty if there is no data yet.
    pub fn retrieve_into(&self, caller: CallerId, out: &mut QueryResult) -> bool {
        out.clear();
        let (Some(points), Some(probes)) = (
            self.results.retrieve(caller, ResultField::Points),
            self.results.retrieve(caller, ResultField::NormalProbes),
        ) else {
            return false;
        };

        let sea_level = self.config.sea_level;
        out.displacements.extend_from_slice(points);
        out.heights.extend(points.iter().map(|d| sea_level + d.y));
        out.normals.extend(
            probes
                .chunks_exact(PROBES_PER_NORMAL)
                .map(|p| normal_from_probes(p[0], p[1], p[2])),
        );
        true
    }

    /// Velocity of `caller`'s query points between the last two snapshots.
    pub fn velocity(&self, caller: CallerId, out: &mut [Vec3]) -> QueryStatus {
        self.velocity.estimate(&self.results, caller, out)
    }

    /// Submit, retrieve and optionally difference in one call.
    ///
    /// Every failure is reported in the returned flags; the output holds
    /// whatever succeeded.
    pub fn query(
        &mut self,
        caller: CallerId,
        input: &QueryInput<'_>,
        output: &mut QueryOutput,
    ) -> QueryStatus {
        let mut status = QueryStatus::OK;
        if let Err(error) = self.submit_with_detail(
            caller,
            input.min_spatial_length,
            input.points,
            input.want_normals,
        ) {
            debug!(%caller, %error, "query submission failed");
            status |= QueryStatus::POST_FAILED;
        }

        if !self.retrieve_into(caller, &mut output.result) {
            status |= QueryStatus::RETRIEVE_FAILED;
        }

        output.velocities.clear();
        if input.want_velocities {
            output.velocities.resize(input.points.len(), Vec3::ZERO);
            status |= self.velocity(caller, &mut output.velocities);
        }
        status
    }

    /// Drop all in-flight batches, registrations and results and release
    /// the upload buffer. Safe to call repeatedly; the engine stays usable.
    pub fn cleanup(&mut self) {
        self.requests.clear();
        self.ring.clear_all();
        self.results.clear();
        self.upload = Vec::new();
        self.stalled = false;
        self.exhaustion_latch.reset();
        self.eviction_latch.reset();
        self.failure_latch.reset();
        self.stats = EngineStats::default();
        info!(tick = self.tick, "Query engine cleaned up");
    }

    /// Engine configuration.
    pub fn config(&self) -> &QueryEngineConfig {
        &self.config
    }

    /// The batch executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Mutable access to the batch executor, e.g. to advance its time.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Batches in flight.
    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Callers with data in the current snapshot.
    pub fn result_caller_count(&self) -> usize {
        self.results.caller_count()
    }

    /// Callers registered for the next batch.
    pub fn registered_callers(&self) -> usize {
        self.ring.current().len()
    }

    /// Ticks completed so far.
    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    /// Ring slots held by in-flight batches.
    pub fn ring_occupancy(&self) -> usize {
        self.ring.held_count()
    }

    /// True if the last tick found the ring exhausted.
    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Lifetime counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Registrations for the next batch.
    pub fn current_registrar(&self) -> &SegmentRegistrar {
        self.ring.current()
    }

    /// The registrar ring.
    pub fn ring(&self) -> &SegmentRegistrarRingBuffer {
        &self.ring
    }

    /// Accepted snapshots.
    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    fn limits(&self) -> SegmentLimits {
        SegmentLimits {
            capacity: self.config.max_query_count,
            max_callers: self.config.max_callers,
        }
    }

    fn upload_buffer(&mut self) -> &mut [SamplePoint] {
        if self.upload.len() != self.config.max_query_count {
            self.upload
                .resize(self.config.max_query_count, SamplePoint::default());
        }
        &mut self.upload
    }

    fn submit_current(&mut self, time: Time) -> bool {
        let mut evicted = false;
        if self.requests.len() >= self.requests.max_in_flight() {
            evicted = self.requests.evict_oldest(&mut self.ring);
        }

        if !self.ring.can_acquire() {
            self.stalled = true;
            self.stats.exhausted_ticks += 1;
            if self.exhaustion_latch.trip() && !self.config.quiet_exhaustion {
                error!(
                    held = self.ring.held_count(),
                    in_flight = self.requests.len(),
                    "Query ring buffer exhausted; batch results are not being polled"
                );
            }
            return false;
        }

        let total = self.ring.current().total_points();
        let slot = self.ring.current_index();
        let Some(points) = self.upload.get(..total) else {
            warn!(total, "Upload buffer shorter than registrar; skipping batch");
            return false;
        };

        match self.requests.submit(
            &mut self.executor,
            points,
            slot,
            time,
            self.tick,
            &mut self.ring,
        ) {
            Ok(evicted_on_submit) => {
                self.stats.batches_submitted += 1;
                if evicted || evicted_on_submit {
                    self.stats.requests_evicted += 1;
                    if self.eviction_latch.trip() {
                        warn!(
                            max_in_flight = self.requests.max_in_flight(),
                            "Request queue full; evicting oldest in-flight batch"
                        );
                    }
                } else {
                    self.eviction_latch.reset();
                }
            }
            Err(error) => {
                self.stats.submit_failures += 1;
                warn!(%error, "Batch submission failed");
                return false;
            }
        }

        let upload = &mut self.upload;
        let advanced = self.ring.acquire_new(
            self.tick,
            self.config.staleness_ticks,
            |from, to| upload.copy_within(from, to),
        );
        debug!(slot, points = total, "submitted batch");
        advanced
    }

    fn poll_results(&mut self) -> bool {
        let outcome = self.requests.poll(&mut self.executor, &mut self.ring);
        self.stats.requests_failed += outcome.failed as u64;
        self.stats.completed_discarded += outcome.discarded as u64;

        if outcome.failed > 0 {
            if self.failure_latch.trip() {
                warn!(failed = outcome.failed, "Batch executor reported failed requests");
            }
        } else if outcome.accepted.is_some() {
            self.failure_latch.reset();
        }
        if outcome.discarded > 0 {
            debug!(discarded = outcome.discarded, "skipped older completed batches");
        }

        let Some(snapshot) = outcome.accepted else {
            return false;
        };
        debug!(
            timestamp = snapshot.timestamp(),
            callers = snapshot.registrar().len(),
            "accepted result snapshot"
        );
        self.results.accept(snapshot);
        self.stats.results_accepted += 1;
        true
    }
}
