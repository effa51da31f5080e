//! GPU batch executor for swell point queries.
//!
//! Implements [`swell_query::BatchExecutor`] on wgpu. Point sampling is a
//! good fit for compute shaders:
//!
//! - **Embarrassingly parallel**: every point is sampled independently
//! - **Latency tolerant**: the query engine expects results ticks later
//! - **f32 is enough**: results feed physics and rendering, not bookkeeping
//!
//! # Pipeline
//!
//! 1. **Upload**: the packed [`SamplePoint`](swell_foundation::SamplePoint)
//!    buffer is copied to a storage buffer as `vec4<f32>`.
//! 2. **Dispatch**: a WGSL compute kernel calls the user's `sample_field`
//!    once per point (see [`shaders`]).
//! 3. **Readback**: results are copied to a staging buffer and mapped
//!    asynchronously; `poll` never waits on the device.
//!
//! Without the `gpu` feature only the configuration, shader sources and
//! the CPU reference field are available.

mod config;
mod error;
pub mod shaders;

#[cfg(feature = "gpu")]
mod context;
#[cfg(feature = "gpu")]
mod executor;
#[cfg(feature = "gpu")]
mod pipeline;

pub use config::{GpuExecutorConfig, MAX_WORKGROUPS_PER_DIMENSION};
pub use error::GpuError;
pub use shaders::{GERSTNER_SAMPLE_FIELD, gerstner_displacement};

#[cfg(feature = "gpu")]
pub use context::GpuContext;
#[cfg(feature = "gpu")]
pub use executor::{GpuBatchExecutor, GpuPending};
#[cfg(feature = "gpu")]
pub use pipeline::SamplerPipeline;

/// True if this build can create a [`GpuBatchExecutor`].
pub const fn gpu_enabled() -> bool {
    cfg!(feature = "gpu")
}
