//! Sample-point layout and normal probes.
//!
//! A caller's segment in the upload buffer is laid out as
//! `[query points..., probes for normal 0 (3), probes for normal 1 (3), ...]`.
//! Each normal is recovered from three probes (center, +X, +Z) once the
//! batch comes back.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Distance between a normal's center probe and its +X / +Z probes.
pub const NORMAL_PROBE_OFFSET: f32 = 0.1;

/// Points uploaded per requested normal.
pub const PROBES_PER_NORMAL: usize = 3;

/// One point uploaded to a batch executor.
///
/// Laid out as a `vec4<f32>` (`xyz` position, `w` min grid size) so it can
/// be copied straight into a GPU storage buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SamplePoint {
    /// World-space query position.
    pub position: Vec3,
    /// Smallest grid cell the sampler needs to resolve. Zero means full detail.
    pub min_grid_size: f32,
}

impl SamplePoint {
    /// Create a sample point.
    pub const fn new(position: Vec3, min_grid_size: f32) -> Self {
        Self {
            position,
            min_grid_size,
        }
    }
}

/// Minimum grid size worth sampling for an object of the given extent.
///
/// The smallest wavelength that matters repeats no more than twice across
/// the object, and is sampled twice per wavelength.
pub fn min_grid_size_for(min_spatial_length: f32) -> f32 {
    let min_wavelength = min_spatial_length.max(0.0) / 2.0;
    let samples_per_wave = 2.0;
    min_wavelength / samples_per_wave
}

/// The three probes (center, +X, +Z) uploaded for one normal at `center`.
pub fn normal_probes(center: Vec3, min_grid_size: f32) -> [SamplePoint; PROBES_PER_NORMAL] {
    [
        SamplePoint::new(center, min_grid_size),
        SamplePoint::new(center + Vec3::X * NORMAL_PROBE_OFFSET, min_grid_size),
        SamplePoint::new(center + Vec3::Z * NORMAL_PROBE_OFFSET, min_grid_size),
    ]
}

/// Rebuild a surface normal from the displacements sampled at the three
/// probes of one normal.
///
/// The displaced probe positions span two edges of a small surface patch;
/// their cross product is oriented so an undisturbed surface gives `+Y`.
/// Degenerate patches return `Vec3::ZERO`.
pub fn normal_from_probes(center: Vec3, plus_x: Vec3, plus_z: Vec3) -> Vec3 {
    let edge_x = Vec3::X * NORMAL_PROBE_OFFSET + plus_x - center;
    let edge_z = Vec3::Z * NORMAL_PROBE_OFFSET + plus_z - center;
    edge_z.cross(edge_x).normalize_or_zero()
}
