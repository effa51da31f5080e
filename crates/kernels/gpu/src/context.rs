//! Device ownership and the per-batch buffer lifecycle.
//!
//! Every batch gets its own buffers and walks three stages, all of which
//! live here so the executor only records the dispatch itself:
//!
//! 1. [`GpuContext::stage_batch`] allocates the batch's buffers and queues
//!    the point and parameter uploads
//! 2. [`GpuContext::submit_with_readback`] appends the copy into a staging
//!    buffer, submits, and requests `map_async`
//! 3. [`Readback::try_read`] checks the mapping flag and copies the values
//!    out exactly once
//!
//! Only device creation blocks.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use glam::Vec3;
use swell_foundation::SamplePoint;
use tracing::{debug, info};

use crate::error::GpuError;
use crate::shaders::SamplerParams;

/// Bytes per point in and out (`vec4<f32>`).
pub(crate) const POINT_STRIDE: u64 = std::mem::size_of::<[f32; 4]>() as u64;

const MAP_PENDING: u8 = 0;
const MAP_READY: u8 = 1;
const MAP_FAILED: u8 = 2;
const CONSUMED: u8 = 3;

/// wgpu device and queue shared by the sampler pipeline and every batch.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
}

impl GpuContext {
    /// Open the highest-performance adapter on the primary backends.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|_| GpuError::NoAdapter)?;

        let info = adapter.get_info();
        info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "GPU adapter selected"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Swell Sampler"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            ..Default::default()
        }))
        .map_err(|e: wgpu::RequestDeviceError| GpuError::DeviceRequest(e.to_string()))?;

        Ok(Self {
            device,
            queue,
            adapter_name: info.name,
        })
    }

    /// Name of the selected adapter.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    pub(crate) fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Allocate one batch's buffers and queue its uploads.
    pub(crate) fn stage_batch(&self, points: &[SamplePoint], params: SamplerParams) -> BatchBuffers {
        // zero-sized bindings are invalid
        let size = points.len().max(1) as u64 * POINT_STRIDE;

        let buffers = BatchBuffers {
            points: self.buffer(
                "Sample Points",
                size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
            results: self.buffer(
                "Sample Results",
                size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            ),
            params: self.buffer(
                "Sampler Params",
                std::mem::size_of::<SamplerParams>() as u64,
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            ),
            staging: self.buffer(
                "Sample Readback",
                size,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            ),
            size,
            len: points.len(),
        };

        if !points.is_empty() {
            self.queue
                .write_buffer(&buffers.points, 0, bytemuck::cast_slice(points));
        }
        self.queue
            .write_buffer(&buffers.params, 0, bytemuck::bytes_of(&params));
        buffers
    }

    /// Copy the batch's results to its staging buffer, submit `encoder`,
    /// and start mapping. The device-side buffers are dropped here; wgpu
    /// keeps them alive until the submission retires.
    pub(crate) fn submit_with_readback(
        &self,
        mut encoder: wgpu::CommandEncoder,
        buffers: BatchBuffers,
    ) -> Readback {
        let BatchBuffers {
            results,
            staging,
            size,
            len,
            ..
        } = buffers;

        encoder.copy_buffer_to_buffer(&results, 0, &staging, 0, size);
        self.queue.submit(Some(encoder.finish()));

        let state = Arc::new(AtomicU8::new(MAP_PENDING));
        let flag = Arc::clone(&state);
        staging
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                let next = if result.is_ok() { MAP_READY } else { MAP_FAILED };
                flag.store(next, Ordering::Release);
            });

        Readback {
            staging,
            len,
            state,
        }
    }

    /// Run ready device callbacks without waiting.
    pub(crate) fn poll_device(&self) {
        if let Err(error) = self.device.poll(wgpu::PollType::Poll) {
            debug!(%error, "device poll failed");
        }
    }

    fn buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }
}

/// Buffers owned by one batch between staging and submission.
pub(crate) struct BatchBuffers {
    pub(crate) points: wgpu::Buffer,
    pub(crate) results: wgpu::Buffer,
    pub(crate) params: wgpu::Buffer,
    staging: wgpu::Buffer,
    size: u64,
    len: usize,
}

impl BatchBuffers {
    /// Points in the batch.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

/// What [`Readback::try_read`] found.
#[derive(Debug)]
pub(crate) enum ReadbackState {
    Pending,
    Ready(Vec<Vec3>),
    Failed(GpuError),
}

/// A staging buffer being mapped for one batch.
#[derive(Debug)]
pub(crate) struct Readback {
    staging: wgpu::Buffer,
    len: usize,
    state: Arc<AtomicU8>,
}

impl Readback {
    /// Copy the results out if the mapping finished. Succeeds at most once.
    pub(crate) fn try_read(&self) -> ReadbackState {
        match claim(&self.state) {
            MAP_PENDING => ReadbackState::Pending,
            MAP_READY => {
                let values = {
                    let mapped = self.staging.slice(..).get_mapped_range();
                    bytemuck::try_cast_slice::<u8, [f32; 4]>(&mapped[..])
                        .map(|raw| decode(raw, self.len))
                        .map_err(|e| GpuError::BufferMapping(e.to_string()))
                };
                self.staging.unmap();
                match values {
                    Ok(values) => ReadbackState::Ready(values),
                    Err(error) => ReadbackState::Failed(error),
                }
            }
            MAP_FAILED => ReadbackState::Failed(GpuError::BufferMapping(
                "staging buffer mapping failed".to_string(),
            )),
            _ => ReadbackState::Failed(GpuError::BufferMapping(
                "results already read".to_string(),
            )),
        }
    }
}

/// Load the mapping state, moving `MAP_READY` to `CONSUMED` so only one
/// reader sees it.
fn claim(state: &AtomicU8) -> u8 {
    match state.compare_exchange(MAP_READY, CONSUMED, Ordering::AcqRel, Ordering::Acquire) {
        Ok(ready) => ready,
        Err(current) => current,
    }
}

/// First `len` results as `Vec3`, dropping the padding lane.
fn decode(raw: &[[f32; 4]], len: usize) -> Vec<Vec3> {
    raw.iter()
        .take(len)
        .map(|v| Vec3::new(v[0], v[1], v[2]))
        .collect()
}
