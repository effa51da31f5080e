//! CPU batch executor with emulated latency.
//!
//! Evaluates a field function over the whole batch at submission (in
//! parallel) and then withholds the result until a fixed number of polls,
//! which reproduces the round-trip delay of an accelerator readback. With
//! one poll per tick, a latency of `n` delivers a batch `n` ticks after it
//! was submitted.

use glam::Vec3;
use rayon::prelude::*;
use swell_foundation::{SamplePoint, Time};

use crate::error::ExecutorError;
use crate::executor::{BatchExecutor, BatchPoll};

/// Field function: displacement (or flow) at a sample point and time.
pub type FieldFn = Box<dyn Fn(&SamplePoint, Time) -> Vec3 + Send + Sync>;

/// Handle for a batch submitted to a [`DeferredExecutor`].
#[derive(Debug)]
pub struct DeferredPending {
    id: u64,
    values: Option<Vec<Vec3>>,
    remaining_polls: u32,
    fail: bool,
}

impl DeferredPending {
    /// Submission sequence number, starting at zero.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// [`BatchExecutor`] that samples a Rust closure on the CPU.
pub struct DeferredExecutor {
    field: FieldFn,
    time: Time,
    latency_polls: u32,
    fail_every: Option<u64>,
    submitted: u64,
}

impl DeferredExecutor {
    /// Create an executor over `field` with no latency.
    pub fn new<F>(field: F) -> Self
    where
        F: Fn(&SamplePoint, Time) -> Vec3 + Send + Sync + 'static,
    {
        Self {
            field: Box::new(field),
            time: 0.0,
            latency_polls: 0,
            fail_every: None,
            submitted: 0,
        }
    }

    /// Complete each batch on its `polls`th poll. Zero and one both
    /// complete on the first poll.
    pub fn with_latency(mut self, polls: u32) -> Self {
        self.latency_polls = polls;
        self
    }

    /// Fail every `n`th batch (the `n`th, `2n`th, ...). Zero disables.
    pub fn with_failure_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Set the field time sampled by subsequent batches.
    pub fn set_time(&mut self, time: Time) {
        self.time = time;
    }

    /// Field time sampled by the next batch.
    pub fn time(&self) -> Time {
        self.time
    }

    /// Configured latency in polls.
    pub fn latency_polls(&self) -> u32 {
        self.latency_polls
    }

    /// Batches submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("time", &self.time)
            .field("latency_polls", &self.latency_polls)
            .field("fail_every", &self.fail_every)
            .field("submitted", &self.submitted)
            .finish_non_exhaustive()
    }
}

impl BatchExecutor for DeferredExecutor {
    type Pending = DeferredPending;

    fn submit_batch(&mut self, points: &[SamplePoint]) -> Result<DeferredPending, ExecutorError> {
        let id = self.submitted;
        self.submitted += 1;

        let field = &self.field;
        let time = self.time;
        let values = points.par_iter().map(|p| field(p, time)).collect();

        Ok(DeferredPending {
            id,
            values: Some(values),
            remaining_polls: self.latency_polls.saturating_sub(1),
            fail: self.fail_every.is_some_and(|n| (id + 1) % n == 0),
        })
    }

    fn poll(&mut self, pending: &mut DeferredPending) -> BatchPoll {
        if pending.remaining_polls > 0 {
            pending.remaining_polls -= 1;
            return BatchPoll::NotDone;
        }
        if pending.fail {
            return BatchPoll::Error(format!("injected failure for batch {}", pending.id));
        }
        match pending.values.take() {
            Some(values) => BatchPoll::Done(values),
            None => BatchPoll::Error(format!("batch {} already consumed", pending.id)),
        }
    }
}
