//! Bake materials: named texel programs executed once per output texel.

use std::fmt;
use std::sync::Arc;

use glam::{Vec2, Vec4};

use crate::{TexelInputs, TextureHandle};

/// Computes the value of every output surface at one texel.
///
/// `out` has one entry per render target surface. Single-channel surfaces read
/// the `x` component.
pub trait TexelProgram: Send + Sync {
    fn shade(&self, uv: Vec2, inputs: &TexelInputs, out: &mut [Vec4]);
}

impl<F> TexelProgram for F
where
    F: Fn(Vec2, &TexelInputs, &mut [Vec4]) + Send + Sync,
{
    fn shade(&self, uv: Vec2, inputs: &TexelInputs, out: &mut [Vec4]) {
        self(uv, inputs, out)
    }
}

/// A computation descriptor assigned to a baker: a texel program plus the
/// textures it reads.
///
/// Cloning is cheap; the program is shared.
#[derive(Clone)]
pub struct BakeMaterial {
    name: String,
    program: Arc<dyn TexelProgram>,
    inputs: Vec<TextureHandle>,
}

impl BakeMaterial {
    pub fn new(name: impl Into<String>, program: Arc<dyn TexelProgram>) -> Self {
        Self {
            name: name.into(),
            program,
            inputs: Vec::new(),
        }
    }

    /// Build a material from a closure.
    pub fn from_fn<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec2, &TexelInputs, &mut [Vec4]) + Send + Sync + 'static,
    {
        Self::new(name, Arc::new(f))
    }

    /// Bind `texture` to the next input slot.
    pub fn with_input(mut self, texture: TextureHandle) -> Self {
        self.inputs.push(texture);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &Arc<dyn TexelProgram> {
        &self.program
    }

    pub fn inputs(&self) -> &[TextureHandle] {
        &self.inputs
    }
}

impl fmt::Debug for BakeMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BakeMaterial")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .finish_non_exhaustive()
    }
}

/// Normalized coordinates of texel `(x, y)` in a target of `resolution` texels
/// per side.
///
/// Texels sit on the corners of the unit square: the first texel samples `0`
/// and the last samples `1`, so a `(n + 1)`-texel target samples exactly the
/// vertices of an `n`-quad grid.
pub fn texel_uv(x: u32, y: u32, resolution: u32) -> Vec2 {
    if resolution <= 1 {
        return Vec2::splat(0.5);
    }
    let last = (resolution - 1) as f32;
    Vec2::new(x as f32 / last, y as f32 / last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texel_uv_corners() {
        assert_eq!(texel_uv(0, 0, 17), Vec2::ZERO);
        assert_eq!(texel_uv(16, 16, 17), Vec2::ONE);
        assert_eq!(texel_uv(8, 4, 17), Vec2::new(0.5, 0.25));
        assert_eq!(texel_uv(0, 0, 1), Vec2::splat(0.5));
    }

    #[test]
    fn test_closure_material() {
        let m = BakeMaterial::from_fn("gradient", |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
            out[0] = Vec4::new(uv.x, uv.y, 0.0, 1.0);
        })
        .with_input(TextureHandle(4));
        let mut out = [Vec4::ZERO];
        m.program()
            .shade(Vec2::new(0.25, 0.75), &TexelInputs::default(), &mut out);
        assert_eq!(out[0], Vec4::new(0.25, 0.75, 0.0, 1.0));
        assert_eq!(m.name(), "gradient");
        assert_eq!(m.inputs(), &[TextureHandle(4)]);
        assert!(format!("{m:?}").contains("gradient"));
    }
}
