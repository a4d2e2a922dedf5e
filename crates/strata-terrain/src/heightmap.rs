//! Multi-octave fractal Brownian motion (fBm) height sampler.
//!
//! Composites octaves of 3D simplex noise over world positions. Octaves can be
//! evaluated in ranges so that coarse octaves are baked once into a shared
//! cache and only the fine ones are evaluated per tile.

use std::ops::Range;

use glam::DVec3;
use noise::{NoiseFn, Simplex};
use strata_config::FractalConfig;

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightmapParams {
    pub seed: u32,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per meter.
    pub base_frequency: f64,
    /// Amplitude of the first octave, in meters.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self::from(&FractalConfig::default())
    }
}

impl From<&FractalConfig> for HeightmapParams {
    fn from(config: &FractalConfig) -> Self {
        Self {
            seed: config.seed,
            octaves: config.octaves,
            lacunarity: config.lacunarity,
            persistence: config.persistence,
            base_frequency: config.base_frequency,
            amplitude: config.amplitude,
        }
    }
}

/// Terrain heights from fBm over simplex noise.
#[derive(Clone)]
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed);
        Self { noise, params }
    }

    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }

    pub fn octave_frequency(&self, octave: u32) -> f64 {
        self.params.base_frequency * self.params.lacunarity.powi(octave as i32)
    }

    pub fn octave_amplitude(&self, octave: u32) -> f64 {
        self.params.amplitude * self.params.persistence.powi(octave as i32)
    }

    /// Height at a world position, all octaves.
    pub fn sample_3d(&self, point: DVec3) -> f64 {
        self.sample_octaves(point, 0..self.params.octaves)
    }

    /// Sum of the octaves in `octaves` only.
    pub fn sample_octaves(&self, point: DVec3, octaves: Range<u32>) -> f64 {
        let end = octaves.end.min(self.params.octaves);
        let mut total = 0.0;
        for octave in octaves.start..end {
            let p = point * self.octave_frequency(octave);
            total += self.noise.get([p.x, p.y, p.z]) * self.octave_amplitude(octave);
        }
        total
    }

    /// Single noise octave in `[-1, 1]` at an arbitrary frequency.
    pub fn raw(&self, point: DVec3, frequency: f64) -> f64 {
        let p = point * frequency;
        self.noise.get([p.x, p.y, p.z])
    }

    /// Theoretical maximum absolute height (geometric series sum).
    pub fn max_amplitude(&self) -> f64 {
        (0..self.params.octaves).map(|o| self.octave_amplitude(o)).sum()
    }

    /// Number of leading octaves a grid with `texel_spacing` meters between
    /// samples can represent without aliasing: those with at least two samples
    /// per wavelength.
    pub fn resolvable_octaves(&self, texel_spacing: f64) -> u32 {
        if texel_spacing <= 0.0 {
            return self.params.octaves;
        }
        let nyquist = 0.5 / texel_spacing;
        (0..self.params.octaves)
            .take_while(|o| self.octave_frequency(*o) <= nyquist)
            .count() as u32
    }
}
