//! Single-point and single-ray sampling helpers.
//!
//! Each helper owns one caller id and issues at most one query per tick
//! through [`QueryEngine::query`]. Results lag the query by the executor
//! latency, so the first few samples after creation return `None`.

use glam::{Vec2, Vec3};
use swell_foundation::{CallerId, Tick};
use tracing::warn;

use crate::engine::{QueryEngine, QueryInput, QueryOutput};
use crate::error::{QueryError, Result};
use crate::executor::BatchExecutor;

/// Upper bound on the points a [`RayTraceHelper`] submits per trace.
pub const MAX_RAY_STEPS: usize = 128;

/// Samples the surface at one position per tick under a fixed caller id.
///
/// Call [`init`](Self::init) once per tick, then one of the `sample_*`
/// methods. Each `init` primes exactly one sample.
#[derive(Debug, Clone)]
pub struct SampleHeightHelper {
    caller: CallerId,
    position: Vec3,
    min_spatial_length: f32,
    primed: bool,
    last_init: Option<Tick>,
    allow_repeat_init: bool,
    output: QueryOutput,
}

impl SampleHeightHelper {
    /// Create a helper issuing queries as `caller`.
    pub fn new(caller: CallerId) -> Self {
        Self {
            caller,
            position: Vec3::ZERO,
            min_spatial_length: 0.0,
            primed: false,
            last_init: None,
            allow_repeat_init: false,
            output: QueryOutput::default(),
        }
    }

    /// Accept several `init` calls in one tick without warning, e.g. for
    /// hosts that run more than one fixed step per tick.
    pub fn allow_multiple_inits_per_tick(mut self) -> Self {
        self.allow_repeat_init = true;
        self
    }

    /// The caller id queries are issued under.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Set the position and detail level for the next sample.
    ///
    /// Returns `false`, after logging a warning, if this helper was already
    /// initialised during the engine's current tick. The new position still
    /// replaces the old one.
    pub fn init<E: BatchExecutor>(
        &mut self,
        engine: &QueryEngine<E>,
        position: Vec3,
        min_spatial_length: f32,
    ) -> bool {
        let tick = engine.current_tick();
        let repeated = self.last_init == Some(tick);
        self.last_init = Some(tick);
        self.position = position;
        self.min_spatial_length = min_spatial_length;
        self.primed = true;

        if repeated && !self.allow_repeat_init {
            warn!(
                caller = %self.caller,
                tick,
                "SampleHeightHelper initialised more than once in one tick; \
                 use one helper per query point"
            );
            return false;
        }
        true
    }

    /// Surface height at the primed position.
    pub fn sample_height<E: BatchExecutor>(&mut self, engine: &mut QueryEngine<E>) -> Option<f32> {
        self.sample(engine, false, false)?;
        self.output.result.heights.first().copied()
    }

    /// Surface height and normal at the primed position.
    pub fn sample_height_normal<E: BatchExecutor>(
        &mut self,
        engine: &mut QueryEngine<E>,
    ) -> Option<(f32, Vec3)> {
        self.sample(engine, true, false)?;
        let result = &self.output.result;
        Some((*result.heights.first()?, *result.normals.first()?))
    }

    /// Surface height, normal and velocity at the primed position.
    ///
    /// The velocity is zero while fewer than two comparable snapshots
    /// exist; height and normal are still returned.
    pub fn sample_height_normal_velocity<E: BatchExecutor>(
        &mut self,
        engine: &mut QueryEngine<E>,
    ) -> Option<(f32, Vec3, Vec3)> {
        self.sample(engine, true, true)?;
        let result = &self.output.result;
        let velocity = self.velocity();
        Some((*result.heights.first()?, *result.normals.first()?, velocity))
    }

    /// Displacement that carries the primed position onto the surface,
    /// with the normal and velocity there.
    ///
    /// The displacement excludes sea level.
    pub fn sample_displacement<E: BatchExecutor>(
        &mut self,
        engine: &mut QueryEngine<E>,
    ) -> Option<(Vec3, Vec3, Vec3)> {
        self.sample(engine, true, true)?;
        let result = &self.output.result;
        let velocity = self.velocity();
        Some((*result.displacements.first()?, *result.normals.first()?, velocity))
    }

    fn velocity(&self) -> Vec3 {
        self.output.velocities.first().copied().unwrap_or(Vec3::ZERO)
    }

    fn sample<E: BatchExecutor>(
        &mut self,
        engine: &mut QueryEngine<E>,
        want_normals: bool,
        want_velocities: bool,
    ) -> Option<()> {
        if !std::mem::replace(&mut self.primed, false) {
            return None;
        }
        let points = [self.position];
        let mut input =
            QueryInput::new(&points).with_min_spatial_length(self.min_spatial_length);
        input.want_normals = want_normals;
        input.want_velocities = want_velocities;

        let status = engine.query(self.caller, &input, &mut self.output);
        status.retrieve_succeeded().then_some(())
    }
}

/// Samples horizontal flow at one position per tick.
///
/// Meant for an engine whose executor returns flow vectors; only the `x`
/// and `z` channels are read.
#[derive(Debug, Clone)]
pub struct SampleFlowHelper {
    caller: CallerId,
    position: Vec3,
    min_spatial_length: f32,
    primed: bool,
    output: QueryOutput,
}

impl SampleFlowHelper {
    /// Create a helper issuing queries as `caller`.
    pub fn new(caller: CallerId) -> Self {
        Self {
            caller,
            position: Vec3::ZERO,
            min_spatial_length: 0.0,
            primed: false,
            output: QueryOutput::default(),
        }
    }

    /// The caller id queries are issued under.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Set the position and detail level for the next sample.
    pub fn init(&mut self, position: Vec3, min_spatial_length: f32) {
        self.position = position;
        self.min_spatial_length = min_spatial_length;
        self.primed = true;
    }

    /// Flow at the primed position as `(x, z)`.
    pub fn sample<E: BatchExecutor>(&mut self, engine: &mut QueryEngine<E>) -> Option<Vec2> {
        if !std::mem::replace(&mut self.primed, false) {
            return None;
        }
        let points = [self.position];
        let input = QueryInput::new(&points).with_min_spatial_length(self.min_spatial_length);
        let status = engine.query(self.caller, &input, &mut self.output);
        if !status.retrieve_succeeded() {
            return None;
        }
        let flow = self.output.result.displacements.first()?;
        Some(Vec2::new(flow.x, flow.z))
    }
}

/// Traces a ray against the surface by sampling at fixed steps along it
/// and interpolating the first crossing.
#[derive(Debug, Clone)]
pub struct RayTraceHelper {
    caller: CallerId,
    points: Vec<Vec3>,
    step: f32,
    min_spatial_length: f32,
    primed: bool,
    output: QueryOutput,
}

impl RayTraceHelper {
    /// Create a tracer for rays of `length`, sampled every `step`.
    ///
    /// Rays needing more than [`MAX_RAY_STEPS`] samples get a longer step.
    pub fn new(caller: CallerId, length: f32, step: f32) -> Result<Self> {
        if !(length.is_finite() && length > 0.0 && step > 0.0) {
            return Err(QueryError::InvalidRay { length, step });
        }

        let mut step_count = (length / step).ceil() as usize + 1;
        let mut step = step;
        if step_count > MAX_RAY_STEPS {
            step_count = MAX_RAY_STEPS;
            step = length / (step_count - 1) as f32;
            warn!(
                max_steps = MAX_RAY_STEPS,
                step, "Ray needs too many steps; step size increased"
            );
        }

        Ok(Self {
            caller,
            points: vec![Vec3::ZERO; step_count],
            step,
            min_spatial_length: 0.0,
            primed: false,
            output: QueryOutput::default(),
        })
    }

    /// The caller id queries are issued under.
    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Number of sample points along the ray.
    pub fn step_count(&self) -> usize {
        self.points.len()
    }

    /// Distance between sample points.
    pub fn step_size(&self) -> f32 {
        self.step
    }

    /// Lay out the sample points for this tick's ray.
    pub fn init(&mut self, origin: Vec3, direction: Vec3) {
        let direction = direction.normalize_or_zero();
        for (i, point) in self.points.iter_mut().enumerate() {
            *point = origin + direction * (i as f32 * self.step);
        }
        // half a wavelength per step at most
        self.min_spatial_length = self.step * 4.0;
        self.primed = true;
    }

    /// Distance along the ray to its first surface crossing.
    ///
    /// `None` until results for this caller exist, or if the ray stays on
    /// one side of the surface.
    pub fn trace<E: BatchExecutor>(&mut self, engine: &mut QueryEngine<E>) -> Option<f32> {
        if !std::mem::replace(&mut self.primed, false) {
            return None;
        }
        let input =
            QueryInput::new(&self.points).with_min_spatial_length(self.min_spatial_length);
        let status = engine.query(self.caller, &input, &mut self.output);
        if !status.retrieve_succeeded() {
            return None;
        }

        let sea_level = engine.config().sea_level;
        let above: Vec<f32> = self
            .points
            .iter()
            .zip(&self.output.result.displacements)
            .map(|(p, d)| sea_level + d.y - p.y)
            .collect();

        above.windows(2).enumerate().find_map(|(i, pair)| {
            let (h0, h1) = (pair[0], pair[1]);
            ((h0 >= 0.0) != (h1 >= 0.0)).then(|| {
                let fraction = h0.abs() / (h0.abs() + h1.abs());
                (i as f32 + fraction) * self.step
            })
        })
    }
}
