//! Compute pipeline for the point sampler.

use std::borrow::Cow;

use crate::config::GpuExecutorConfig;
use crate::context::{BatchBuffers, GpuContext};
use crate::error::GpuError;
use crate::shaders::sampler_shader;

/// Compiled sampler shader plus its bind group layout.
pub struct SamplerPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl SamplerPipeline {
    /// Compile the sampler around the configured `sample_field`.
    ///
    /// Blocks until validation has finished so a bad shader fails here
    /// rather than on the first batch.
    pub fn new(context: &GpuContext, config: &GpuExecutorConfig) -> Result<Self, GpuError> {
        let source = sampler_shader(&config.sample_field, config.workgroup_size);

        context
            .device()
            .push_error_scope(wgpu::ErrorFilter::Validation);

        let shader_module = context
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Point Sampler Shader"),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
            });

        let bind_group_layout =
            context
                .device()
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Point Sampler Bind Group Layout"),
                    entries: &[
                        // Sample points (read-only)
                        storage_entry(0, true),
                        // Results (read-write)
                        storage_entry(1, false),
                        // Params
                        wgpu::BindGroupLayoutEntry {
                            binding: 2,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            count: None,
                        },
                    ],
                });

        let pipeline_layout =
            context
                .device()
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("Point Sampler Pipeline Layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    ..Default::default()
                });

        let pipeline =
            context
                .device()
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some("Point Sampler Pipeline"),
                    layout: Some(&pipeline_layout),
                    module: &shader_module,
                    entry_point: Some("main"),
                    compilation_options: Default::default(),
                    cache: None,
                });

        if let Some(error) = pollster::block_on(context.device().pop_error_scope()) {
            return Err(GpuError::ShaderCompilation(error.to_string()));
        }

        Ok(Self {
            pipeline,
            bind_group_layout,
        })
    }

    /// The compute pipeline.
    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Bind one batch's buffers.
    pub(crate) fn bind_group(&self, context: &GpuContext, buffers: &BatchBuffers) -> wgpu::BindGroup {
        context
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Point Sampler Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffers.points.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: buffers.results.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: buffers.params.as_entire_binding(),
                    },
                ],
            })
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
