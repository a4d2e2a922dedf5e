//! CPU-side texture contents and the inputs bound to a bake pass.

use std::sync::Arc;

use glam::{Vec2, Vec4};

use crate::SurfaceFormat;

/// Texture contents, row-major, one `Vec4` per texel.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub resolution: u32,
    pub format: SurfaceFormat,
    pub texels: Vec<Vec4>,
}

impl TextureData {
    pub fn texel(&self, x: u32, y: u32) -> Vec4 {
        self.texels[(y as usize) * (self.resolution as usize) + x as usize]
    }

    /// Bilinear sample with the same corner-aligned convention as
    /// [`texel_uv`](crate::texel_uv). Coordinates are clamped to `[0, 1]`.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if self.resolution <= 1 {
            return self.texels.first().copied().unwrap_or(Vec4::ZERO);
        }
        let last = (self.resolution - 1) as f32;
        let p = uv.clamp(Vec2::ZERO, Vec2::ONE) * last;
        let x0 = (p.x.floor() as u32).min(self.resolution - 2);
        let y0 = (p.y.floor() as u32).min(self.resolution - 2);
        let fx = p.x - x0 as f32;
        let fy = p.y - y0 as f32;

        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), fx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    /// Tightly packed bytes in the texture's format.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_surface(self.format, &self.texels)
    }
}

pub(crate) fn encode_surface(format: SurfaceFormat, texels: &[Vec4]) -> Vec<u8> {
    match format {
        SurfaceFormat::Rgba8 => texels
            .iter()
            .flat_map(|t| t.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8))
            .collect(),
        SurfaceFormat::R32Float => {
            let values: Vec<f32> = texels.iter().map(|t| t.x).collect();
            bytemuck::cast_slice(&values).to_vec()
        }
    }
}

/// Textures bound to a bake pass, in the order the material lists them.
///
/// Contents are captured at dispatch time.
#[derive(Clone, Debug, Default)]
pub struct TexelInputs {
    textures: Vec<Arc<TextureData>>,
}

impl TexelInputs {
    pub fn new(textures: Vec<Arc<TextureData>>) -> Self {
        Self { textures }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn texture(&self, slot: usize) -> Option<&TextureData> {
        self.textures.get(slot).map(Arc::as_ref)
    }

    /// Bilinear sample of the texture in `slot`, or zero when the slot is empty.
    pub fn sample(&self, slot: usize, uv: Vec2) -> Vec4 {
        self.texture(slot).map_or(Vec4::ZERO, |t| t.sample(uv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> TextureData {
        TextureData {
            resolution: 3,
            format: SurfaceFormat::R32Float,
            texels: (0..9).map(|i| Vec4::splat((i % 3) as f32)).collect(),
        }
    }

    #[test]
    fn test_bilinear_sample() {
        let t = ramp();
        assert_eq!(t.sample(Vec2::ZERO).x, 0.0);
        assert_eq!(t.sample(Vec2::new(1.0, 0.3)).x, 2.0);
        assert!((t.sample(Vec2::new(0.25, 0.5)).x - 0.5).abs() < 1e-6);
        assert!((t.sample(Vec2::new(0.75, 0.9)).x - 1.5).abs() < 1e-6);
        // Clamped outside the unit square.
        assert_eq!(t.sample(Vec2::new(4.0, -1.0)).x, 2.0);
    }

    #[test]
    fn test_encode_rgba8_clamps() {
        let t = TextureData {
            resolution: 1,
            format: SurfaceFormat::Rgba8,
            texels: vec![Vec4::new(-1.0, 0.5, 1.0, 2.0)],
        };
        assert_eq!(t.to_bytes(), vec![0, 128, 255, 255]);
    }

    #[test]
    fn test_empty_inputs_sample_zero() {
        let inputs = TexelInputs::default();
        assert!(inputs.is_empty());
        assert_eq!(inputs.sample(0, Vec2::ONE), Vec4::ZERO);
    }
}
