//! Query engine error types.

use thiserror::Error;

/// Result alias for query engine operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while registering queries or driving the engine.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The upload buffer cannot fit the requested points.
    #[error("Query capacity exceeded: {requested} points requested, {available} available")]
    CapacityExceeded { requested: usize, available: usize },
    /// Registering a new caller would exceed the caller limit.
    #[error("Too many query callers (max {max})")]
    TooManyCallers { max: usize },
    /// A query with zero points was submitted.
    #[error("Query has no points")]
    EmptyQuery,
    /// Every registrar snapshot is held by an outstanding request.
    #[error("Segment registrar ring exhausted; results are not being polled")]
    RingExhausted,
    /// Configuration validation failure.
    #[error("Invalid query engine config: {0}")]
    InvalidConfig(String),
    /// Ray length or step size is not positive.
    #[error("Invalid ray: length {length}, step {step}")]
    InvalidRay { length: f32, step: f32 },
    /// The batch executor rejected or lost a batch.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl QueryError {
    /// Create a CapacityExceeded error.
    pub fn capacity(requested: usize, available: usize) -> Self {
        Self::CapacityExceeded {
            requested,
            available,
        }
    }
}

/// Failures reported by a batch executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Uploading or dispatching the batch failed.
    #[error("Batch submission failed: {0}")]
    Submit(String),
    /// The returned buffer is shorter than the batch that produced it.
    #[error("Batch result too short: expected {expected} values, got {got}")]
    ResultLength { expected: usize, got: usize },
    /// Reading the result back failed.
    #[error("Batch transport error: {0}")]
    Transport(String),
}
