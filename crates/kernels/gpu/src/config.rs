//! GPU executor configuration.

use crate::error::GpuError;

/// Largest workgroup count wgpu guarantees per dispatch dimension.
pub const MAX_WORKGROUPS_PER_DIMENSION: u32 = 65_535;

/// Configuration for [`GpuBatchExecutor`](crate::GpuBatchExecutor).
#[derive(Debug, Clone)]
pub struct GpuExecutorConfig {
    /// Invocations per compute workgroup.
    pub workgroup_size: u32,
    /// WGSL source defining
    /// `fn sample_field(position: vec3<f32>, min_grid_size: f32, time: f32) -> vec3<f32>`.
    pub sample_field: String,
}

impl GpuExecutorConfig {
    /// Configuration sampling the given WGSL field function.
    pub fn with_sample_field(sample_field: impl Into<String>) -> Self {
        Self {
            sample_field: sample_field.into(),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), GpuError> {
        if self.workgroup_size == 0 || self.workgroup_size > 256 {
            return Err(GpuError::InvalidConfig(format!(
                "workgroup_size must be in 1..=256, got {}",
                self.workgroup_size
            )));
        }
        if !self.sample_field.contains("fn sample_field") {
            return Err(GpuError::InvalidConfig(
                "sample_field source must define `fn sample_field`".to_string(),
            ));
        }
        Ok(())
    }

    /// Largest batch a single dispatch can cover.
    pub fn max_batch_points(&self) -> usize {
        self.workgroup_size as usize * MAX_WORKGROUPS_PER_DIMENSION as usize
    }

    /// Workgroups needed for `points` invocations.
    pub fn workgroup_count(&self, points: usize) -> u32 {
        points.div_ceil(self.workgroup_size.max(1) as usize) as u32
    }
}

impl Default for GpuExecutorConfig {
    fn default() -> Self {
        Self {
            workgroup_size: 64,
            sample_field: crate::shaders::GERSTNER_SAMPLE_FIELD.to_string(),
        }
    }
}
