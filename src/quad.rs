// Scene data for the textured quad
//
// Pixel-space geometry (origin top-left, y down), a 2x2 checker texture and
// the orthographic projection that maps pixels to clip space. Also a CPU
// reference of what the GPU should produce, used by tests.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec4};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

impl QuadVertex {
    const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { position: [x, y], uv: [u, v] }
    }
}

pub const QUAD_VERTEX_COUNT: u32 = 6;

/// Two clockwise triangles covering (0,0)..(size,size), UVs (0,0)..(1,1).
pub fn quad_vertices(size: f32) -> [QuadVertex; QUAD_VERTEX_COUNT as usize] {
    let s = size;
    [
        QuadVertex::new(0.0, 0.0, 0.0, 0.0),
        QuadVertex::new(s, 0.0, 1.0, 0.0),
        QuadVertex::new(s, s, 1.0, 1.0),
        QuadVertex::new(0.0, 0.0, 0.0, 0.0),
        QuadVertex::new(s, s, 1.0, 1.0),
        QuadVertex::new(0.0, s, 0.0, 1.0),
    ]
}

pub const CHECKER_WIDTH: u32 = 2;
pub const CHECKER_HEIGHT: u32 = 2;

/// Dark, mostly opaque
pub const TEXEL_A: u32 = 0xCC00_0000;
/// Opaque red
pub const TEXEL_B: u32 = 0xFF00_00FF;

/// Row-major 2x2 checker: A B / B A. Each texel is RGBA8 packed little-endian
/// (R in the lowest byte).
pub const CHECKER_TEXELS: [u32; 4] = [TEXEL_A, TEXEL_B, TEXEL_B, TEXEL_A];

/// Texture bytes as uploaded to an R8G8B8A8 image.
pub fn checker_bytes() -> Vec<u8> {
    CHECKER_TEXELS.iter().flat_map(|t| t.to_le_bytes()).collect()
}

/// Orthographic projection from pixel coordinates to clip space:
/// (0,0) -> (-1,-1), (width,height) -> (1,1).
pub fn projection(width: f32, height: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(2.0 / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 / height, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(-1.0, -1.0, 0.0, 1.0),
    )
}

/// Nearest-filtered lookup with repeat addressing, as the texture sampler does it.
pub fn sample_nearest(texels: &[u32], width: u32, height: u32, uv: Vec2) -> u32 {
    let wrap = |coord: f32, size: u32| -> u32 {
        let scaled = (coord.rem_euclid(1.0) * size as f32).floor() as u32;
        scaled.min(size - 1)
    };
    let x = wrap(uv.x, width);
    let y = wrap(uv.y, height);
    texels[(y * width + x) as usize]
}

/// What the quad looks like at pixel centers, row-major `size * size` texels.
pub fn rasterize_reference(size: u32) -> Vec<u32> {
    let mut out = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let uv = Vec2::new(x as f32 + 0.5, y as f32 + 0.5) / size as f32;
            out.push(sample_nearest(&CHECKER_TEXELS, CHECKER_WIDTH, CHECKER_HEIGHT, uv));
        }
    }
    out
}
