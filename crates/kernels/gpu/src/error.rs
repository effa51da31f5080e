//! Error types for the GPU batch executor.

use swell_query::ExecutorError;
use thiserror::Error;

/// Errors that can occur while setting up or driving the GPU sampler.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No compatible GPU adapter was found.
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    /// Failed to request GPU device.
    #[error("failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// Shader compilation failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilation(String),

    /// Invalid executor configuration.
    #[error("invalid GPU executor config: {0}")]
    InvalidConfig(String),

    /// The batch needs more workgroups than one dispatch allows.
    #[error("batch of {points} points exceeds the dispatch limit of {max} points")]
    BatchTooLarge { points: usize, max: usize },

    /// Buffer mapping failed.
    #[error("buffer mapping failed: {0}")]
    BufferMapping(String),

    /// GPU feature not enabled.
    #[error("GPU feature not enabled - compile with --features gpu")]
    FeatureNotEnabled,
}

impl From<GpuError> for ExecutorError {
    fn from(error: GpuError) -> Self {
        match error {
            GpuError::BufferMapping(message) => ExecutorError::Transport(message),
            other => ExecutorError::Submit(other.to_string()),
        }
    }
}
