//! Batch executor interface.
//!
//! A batch executor turns an uploaded point buffer into one sampled value
//! per point, asynchronously. The engine submits at most one batch per
//! tick and polls outstanding handles without ever blocking on them.

use glam::Vec3;
use swell_foundation::SamplePoint;

use crate::error::ExecutorError;

/// Completion state of a submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchPoll {
    /// Still running.
    NotDone,
    /// Finished; one value per submitted point.
    Done(Vec<Vec3>),
    /// The batch was lost.
    Error(String),
}

/// An asynchronous sampler of the displaced surface field.
pub trait BatchExecutor {
    /// Handle for one in-flight batch.
    type Pending;

    /// Upload `points` (by copy) and start sampling them.
    fn submit_batch(&mut self, points: &[SamplePoint]) -> Result<Self::Pending, ExecutorError>;

    /// Check a batch without blocking.
    ///
    /// Once `Done` or `Error` has been returned the handle is spent and is
    /// not polled again.
    fn poll(&mut self, pending: &mut Self::Pending) -> BatchPoll;
}

impl<E: BatchExecutor + ?Sized> BatchExecutor for Box<E> {
    type Pending = E::Pending;

    fn submit_batch(&mut self, points: &[SamplePoint]) -> Result<Self::Pending, ExecutorError> {
        (**self).submit_batch(points)
    }

    fn poll(&mut self, pending: &mut Self::Pending) -> BatchPoll {
        (**self).poll(pending)
    }
}
