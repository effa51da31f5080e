//! wgpu implementation of [`BatchExecutor`].
//!
//! Submission stages the batch's buffers on the [`GpuContext`], records
//! the dispatch and hands the encoder back for readback; `poll` only runs
//! device callbacks and checks the mapping flag.

use swell_foundation::{SamplePoint, Time};
use swell_query::{BatchExecutor, BatchPoll, ExecutorError};
use tracing::{debug, info};

use crate::config::GpuExecutorConfig;
use crate::context::{GpuContext, Readback, ReadbackState};
use crate::error::GpuError;
use crate::pipeline::SamplerPipeline;
use crate::shaders::SamplerParams;

/// Handle for one batch in flight on the GPU.
#[derive(Debug)]
pub struct GpuPending {
    id: u64,
    readback: Readback,
}

impl GpuPending {
    /// Submission sequence number.
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Samples a WGSL field function on the GPU with asynchronous readback.
pub struct GpuBatchExecutor {
    context: GpuContext,
    pipeline: SamplerPipeline,
    config: GpuExecutorConfig,
    time: f32,
    submitted: u64,
}

impl GpuBatchExecutor {
    /// Create an executor on the best available adapter.
    pub fn new(config: GpuExecutorConfig) -> Result<Self, GpuError> {
        config.validate()?;
        Self::with_context(GpuContext::new()?, config)
    }

    /// Create an executor on an existing context.
    pub fn with_context(context: GpuContext, config: GpuExecutorConfig) -> Result<Self, GpuError> {
        config.validate()?;
        let pipeline = SamplerPipeline::new(&context, &config)?;
        info!(
            adapter = %context.adapter_name(),
            workgroup_size = config.workgroup_size,
            "GPU batch executor ready"
        );
        Ok(Self {
            context,
            pipeline,
            config,
            time: 0.0,
            submitted: 0,
        })
    }

    /// Set the field time sampled by subsequent batches.
    pub fn set_time(&mut self, time: Time) {
        self.time = time as f32;
    }

    /// The GPU context.
    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    /// Batches submitted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    fn encode_batch(&mut self, points: &[SamplePoint]) -> Result<GpuPending, GpuError> {
        let max = self.config.max_batch_points();
        if points.len() > max {
            return Err(GpuError::BatchTooLarge {
                points: points.len(),
                max,
            });
        }

        let params = SamplerParams::new(self.time, points.len() as u32);
        let buffers = self.context.stage_batch(points, params);
        let bind_group = self.pipeline.bind_group(&self.context, &buffers);

        let mut encoder =
            self.context
                .device()
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Point Sampler Encoder"),
                });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Point Sampler Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(self.pipeline.pipeline());
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(self.config.workgroup_count(buffers.len()).max(1), 1, 1);
        }
        let readback = self.context.submit_with_readback(encoder, buffers);

        let id = self.submitted;
        self.submitted += 1;
        debug!(id, points = points.len(), "GPU batch submitted");
        Ok(GpuPending { id, readback })
    }
}

impl BatchExecutor for GpuBatchExecutor {
    type Pending = GpuPending;

    fn submit_batch(&mut self, points: &[SamplePoint]) -> Result<GpuPending, ExecutorError> {
        self.encode_batch(points).map_err(ExecutorError::from)
    }

    fn poll(&mut self, pending: &mut GpuPending) -> BatchPoll {
        self.context.poll_device();
        match pending.readback.try_read() {
            ReadbackState::Pending => BatchPoll::NotDone,
            ReadbackState::Ready(values) => BatchPoll::Done(values),
            ReadbackState::Failed(error) => BatchPoll::Error(format!("batch {}: {error}", pending.id)),
        }
    }
}
