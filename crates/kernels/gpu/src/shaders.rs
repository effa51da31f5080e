//! WGSL sources for the point sampler.
//!
//! The compute entry point is fixed; the field itself is a user-supplied
//! WGSL function spliced into the template:
//!
//! ```wgsl
//! fn sample_field(position: vec3<f32>, min_grid_size: f32, time: f32) -> vec3<f32>
//! ```
//!
//! Points are read as `vec4<f32>` (`xyz` position, `w` min grid size) and
//! results written as `vec4<f32>` with `w` unused.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// Per-dispatch uniforms. Mirrors `Params` in the WGSL template.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SamplerParams {
    /// Field time in seconds.
    pub time: f32,
    /// Points in the batch.
    pub count: u32,
    /// Uniform padding.
    pub _pad: [u32; 2],
}

impl SamplerParams {
    /// Parameters for one batch.
    pub fn new(time: f32, count: u32) -> Self {
        Self {
            time,
            count,
            _pad: [0; 2],
        }
    }
}

/// Build the compute shader around `sample_field`.
pub fn sampler_shader(sample_field: &str, workgroup_size: u32) -> String {
    format!(
        r#"
struct Params {{
    time: f32,
    count: u32,
    _pad0: u32,
    _pad1: u32,
}}

@group(0) @binding(0) var<storage, read> points: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> output: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> params: Params;

{sample_field}

@compute @workgroup_size({workgroup_size})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let idx = global_id.x;
    if (idx >= params.count) {{
        return;
    }}

    let point = points[idx];
    output[idx] = vec4<f32>(sample_field(point.xyz, point.w, params.time), 0.0);
}}
"#
    )
}

/// Standard gravity used for deep-water dispersion.
pub const GRAVITY: f32 = 9.81;

/// Demo swell: `(dir.x, dir.z, wavelength, amplitude)` per wave, with unit
/// directions.
pub const GERSTNER_WAVES: [[f32; 4]; 4] = [
    [1.0, 0.0, 40.0, 0.6],
    [0.707_106_8, 0.707_106_8, 17.0, 0.3],
    [-0.3, 0.953_939_2, 7.5, 0.12],
    [0.8, -0.6, 2.3, 0.04],
];

/// WGSL `sample_field` summing [`GERSTNER_WAVES`].
///
/// Waves shorter than twice the requested grid size are skipped.
pub const GERSTNER_SAMPLE_FIELD: &str = r#"
const GRAVITY: f32 = 9.81;
const TAU: f32 = 6.28318530718;

var<private> WAVES: array<vec4<f32>, 4> = array<vec4<f32>, 4>(
    vec4<f32>(1.0, 0.0, 40.0, 0.6),
    vec4<f32>(0.7071068, 0.7071068, 17.0, 0.3),
    vec4<f32>(-0.3, 0.9539392, 7.5, 0.12),
    vec4<f32>(0.8, -0.6, 2.3, 0.04),
);

fn sample_field(position: vec3<f32>, min_grid_size: f32, time: f32) -> vec3<f32> {
    var displacement = vec3<f32>(0.0, 0.0, 0.0);
    for (var i = 0u; i < 4u; i = i + 1u) {
        let wave = WAVES[i];
        if (wave.z < 2.0 * min_grid_size) {
            continue;
        }
        let k = TAU / wave.z;
        let omega = sqrt(GRAVITY * k);
        let phase = k * dot(wave.xy, position.xz) - omega * time;
        let horizontal = -wave.w * sin(phase);
        displacement += vec3<f32>(wave.x * horizontal, wave.w * cos(phase), wave.y * horizontal);
    }
    return displacement;
}
"#;

/// CPU evaluation of [`GERSTNER_SAMPLE_FIELD`].
pub fn gerstner_displacement(position: Vec3, min_grid_size: f32, time: f32) -> Vec3 {
    let mut displacement = Vec3::ZERO;
    for [dir_x, dir_z, wavelength, amplitude] in GERSTNER_WAVES {
        if wavelength < 2.0 * min_grid_size {
            continue;
        }
        let k = std::f32::consts::TAU / wavelength;
        let omega = (GRAVITY * k).sqrt();
        let phase = k * (dir_x * position.x + dir_z * position.z) - omega * time;
        let horizontal = -amplitude * phase.sin();
        displacement += Vec3::new(
            dir_x * horizontal,
            amplitude * phase.cos(),
            dir_z * horizontal,
        );
    }
    displacement
}
