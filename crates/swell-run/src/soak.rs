//! Caller churn soak.
//!
//! A population of simulated callers queries the engine every tick.
//! Callers come and go, change their point counts, skip ticks and toggle
//! normals, all driven by a seeded [`RngStream`] so a run can be replayed.
//! After every tick the engine's bookkeeping is checked against its
//! invariants.

use glam::Vec3;
use serde::Serialize;
use swell_foundation::{CallerId, RngStream, Time};
use swell_query::{
    BatchExecutor, DeferredExecutor, EngineStats, QueryEngine, QueryInput, QueryOutput,
    QueryStatus,
};
use tracing::{info, warn};

/// An executor whose field time can be advanced by the driver.
pub trait TimedExecutor: BatchExecutor {
    /// Set the field time sampled by the next batch.
    fn set_time(&mut self, time: Time);
}

impl TimedExecutor for DeferredExecutor {
    fn set_time(&mut self, time: Time) {
        DeferredExecutor::set_time(self, time);
    }
}

#[cfg(feature = "gpu")]
impl TimedExecutor for swell_gpu::GpuBatchExecutor {
    fn set_time(&mut self, time: Time) {
        swell_gpu::GpuBatchExecutor::set_time(self, time);
    }
}

/// Workload shape.
#[derive(Debug, Clone)]
pub struct SoakOptions {
    /// Ticks to run.
    pub ticks: u64,
    /// Simulated callers alive at any time.
    pub callers: usize,
    /// Seconds per tick.
    pub dt: f64,
    /// Upper bound on points per caller.
    pub max_points: usize,
    /// Per-tick probability that a caller leaves and is replaced.
    pub churn: f64,
    /// Per-tick probability that a caller changes its point count.
    pub resize: f64,
    /// Seed for every random decision.
    pub seed: u64,
    /// Log a health line every this many ticks; zero disables.
    pub report_every: u64,
}

impl Default for SoakOptions {
    fn default() -> Self {
        Self {
            ticks: 600,
            callers: 64,
            dt: 1.0 / 60.0,
            max_points: 16,
            churn: 0.02,
            resize: 0.01,
            seed: 42,
            report_every: 60,
        }
    }
}

/// Outcome of a soak run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SoakReport {
    /// Ticks executed.
    pub ticks: u64,
    /// Queries issued.
    pub queries: u64,
    /// Queries that returned data.
    pub retrieved: u64,
    /// Queries without data yet.
    pub retrieve_failures: u64,
    /// Queries whose registration was refused.
    pub post_failures: u64,
    /// Queries with a valid velocity.
    pub velocities: u64,
    /// Callers replaced by churn.
    pub departures: u64,
    /// Ticks where engine bookkeeping broke an invariant.
    pub invariant_violations: u64,
    /// Largest request queue length observed.
    pub max_in_flight: usize,
    /// Engine counters at the end of the run.
    pub engine: EngineStats,
}

#[derive(Debug, Clone)]
struct SimCaller {
    id: CallerId,
    origin: Vec3,
    points: Vec<Vec3>,
    want_normals: bool,
    /// Submits only every `cadence` ticks.
    cadence: u64,
    min_spatial_length: f32,
}

/// Drives a [`QueryEngine`] with a churning caller population.
pub struct Soak {
    options: SoakOptions,
    rng: RngStream,
    callers: Vec<SimCaller>,
    spawned: u64,
    output: QueryOutput,
    report: SoakReport,
}

impl Soak {
    /// Create a soak and its initial population.
    pub fn new(options: SoakOptions) -> Self {
        let mut soak = Self {
            rng: RngStream::derive(options.seed, "soak.callers"),
            callers: Vec::with_capacity(options.callers),
            spawned: 0,
            output: QueryOutput::default(),
            report: SoakReport::default(),
            options,
        };
        for _ in 0..soak.options.callers {
            let caller = soak.spawn();
            soak.callers.push(caller);
        }
        soak
    }

    /// Run every tick and return the report.
    pub fn run<E: TimedExecutor>(mut self, engine: &mut QueryEngine<E>) -> SoakReport {
        for tick in 0..self.options.ticks {
            self.step(engine, tick);
        }
        self.report.ticks = self.options.ticks;
        self.report.engine = engine.stats();
        self.report
    }

    fn step<E: TimedExecutor>(&mut self, engine: &mut QueryEngine<E>, tick: u64) {
        let time = tick as Time * self.options.dt;

        for index in 0..self.callers.len() {
            if self.rng.bool_with_prob(self.options.churn) {
                engine.remove(self.callers[index].id);
                self.callers[index] = self.spawn();
                self.report.departures += 1;
                continue;
            }
            if self.rng.bool_with_prob(self.options.resize) {
                let count = self.point_count();
                let caller = &mut self.callers[index];
                caller.points = layout(caller.origin, count);
            }
            if tick % self.callers[index].cadence == 0 {
                self.query(engine, index);
            }
        }

        engine.executor_mut().set_time(time);
        let outcome = engine.tick(time);

        self.report.max_in_flight = self.report.max_in_flight.max(engine.request_count());
        let mut healthy = engine.current_registrar().is_disjoint()
            && engine.request_count() <= engine.config().max_in_flight_requests
            && engine.ring_occupancy() < engine.ring().capacity();
        if outcome.submitted {
            healthy &= engine.current_registrar().is_dense();
        }
        if !healthy {
            self.report.invariant_violations += 1;
            warn!(tick, "Engine invariant violated");
        }

        let every = self.options.report_every;
        if every > 0 && (tick + 1) % every == 0 {
            info!(
                tick,
                callers = engine.registered_callers(),
                results = engine.result_caller_count(),
                in_flight = engine.request_count(),
                ring = engine.ring_occupancy(),
                retrieved = self.report.retrieved,
                missing = self.report.retrieve_failures,
                "Engine health"
            );
        }
    }

    fn query<E: TimedExecutor>(&mut self, engine: &mut QueryEngine<E>, index: usize) {
        let caller = &self.callers[index];
        let mut input =
            QueryInput::new(&caller.points).with_min_spatial_length(caller.min_spatial_length);
        input.want_normals = caller.want_normals;
        input.want_velocities = true;

        let status = engine.query(caller.id, &input, &mut self.output);
        self.report.queries += 1;
        if status.contains(QueryStatus::POST_FAILED) {
            self.report.post_failures += 1;
        }
        if status.retrieve_succeeded() {
            self.report.retrieved += 1;
        } else {
            self.report.retrieve_failures += 1;
        }
        let velocity_flags = QueryStatus::NOT_ENOUGH_DATA_FOR_VELS
            | QueryStatus::VELOCITY_DATA_INVALIDATED
            | QueryStatus::INVALID_DT_FOR_VELOCITY;
        if status.retrieve_succeeded() && (status.bits() & velocity_flags.bits()) == 0 {
            self.report.velocities += 1;
        }
    }

    fn spawn(&mut self) -> SimCaller {
        let id = CallerId::from_label(&format!("soak.caller.{}", self.spawned));
        self.spawned += 1;

        let origin = Vec3::new(
            self.rng.uniform_range(-200.0, 200.0) as f32,
            0.0,
            self.rng.uniform_range(-200.0, 200.0) as f32,
        );
        let count = self.point_count();
        SimCaller {
            id,
            origin,
            points: layout(origin, count),
            want_normals: self.rng.bool_with_prob(0.3),
            cadence: self.rng.int_range(1, 3) as u64,
            min_spatial_length: self.rng.uniform_range(0.0, 8.0) as f32,
        }
    }

    fn point_count(&mut self) -> usize {
        self.rng.int_range(1, self.options.max_points.max(1) as i64) as usize
    }
}

/// Points on a small grid around `origin`, like a hull's probe points.
fn layout(origin: Vec3, count: usize) -> Vec<Vec3> {
    (0..count)
        .map(|i| origin + Vec3::new((i % 4) as f32, 0.0, (i / 4) as f32))
        .collect()
}
