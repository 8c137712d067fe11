//! Multi-octave base noise layers.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::permutation::PermutationTable;
use super::simplex::simplex3;
use crate::error::ConfigError;

/// Configuration for one multi-octave noise layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseLayer {
    /// Number of octaves summed (at least 1).
    pub octaves: u32,
    /// Frequency of the first octave.
    pub scale: f32,
    /// Amplitude multiplier per octave, in (0, 1].
    pub persistence: f32,
    /// Frequency multiplier per octave, above 1.
    pub octave_lacunarity: f32,
    /// Offset added to every sample position before scaling.
    pub offset: Vec3,
}

impl Default for NoiseLayer {
    fn default() -> Self {
        Self::terrain()
    }
}

impl NoiseLayer {
    /// Height and density layer.
    pub fn terrain() -> Self {
        Self {
            octaves: 7,
            scale: 0.015,
            persistence: 0.85,
            octave_lacunarity: 1.3,
            offset: Vec3::ZERO,
        }
    }

    /// Low-frequency layer used for terrain-layer blending.
    pub fn splat() -> Self {
        Self {
            octaves: 5,
            scale: 0.001,
            persistence: 0.75,
            octave_lacunarity: 1.5,
            offset: Vec3::ZERO,
        }
    }

    /// Layer used to pick tile variants.
    pub fn object() -> Self {
        Self {
            octaves: 4,
            scale: 0.07,
            persistence: 0.5,
            octave_lacunarity: 1.6,
            offset: Vec3::ZERO,
        }
    }

    /// Layer that shapes crater placement.
    pub fn crater() -> Self {
        Self {
            octaves: 3,
            scale: 0.015,
            persistence: 0.98,
            octave_lacunarity: 1.7,
            offset: Vec3::new(155.0, 137.0, 149.0),
        }
    }

    /// Returns a copy with a different position offset.
    pub fn with_offset(self, offset: Vec3) -> Self {
        Self { offset, ..self }
    }

    /// Checks the parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.octaves == 0 {
            return Err(ConfigError::invalid("octaves", "must be at least 1"));
        }
        if !(self.scale > 0.0) {
            return Err(ConfigError::invalid("scale", "must be positive"));
        }
        if !(self.persistence > 0.0 && self.persistence <= 1.0) {
            return Err(ConfigError::invalid("persistence", "must be in (0, 1]"));
        }
        if !(self.octave_lacunarity > 1.0) {
            return Err(ConfigError::invalid("octave_lacunarity", "must exceed 1"));
        }
        Ok(())
    }
}

/// Samples a noise layer at a position.
///
/// Octave amplitudes decay by `persistence` and frequencies grow by
/// `octave_lacunarity`. The sum is normalized by the total amplitude.
///
/// # Arguments
/// * `layer` - Layer parameters
/// * `perm` - Permutation table of the active seed
/// * `pos` - World-space sample position
///
/// # Returns
/// A value in approximately [-1, 1]
pub fn evaluate_base(layer: &NoiseLayer, perm: &PermutationTable, pos: Vec3) -> f32 {
    let p = pos + layer.offset;
    let mut total = 0.0f32;
    let mut amplitude = 1.0f32;
    let mut frequency = layer.scale;
    let mut max_amplitude = 0.0f32;

    for _ in 0..layer.octaves.max(1) {
        total += simplex3(perm, p * frequency) * amplitude;
        max_amplitude += amplitude;
        amplitude *= layer.persistence;
        frequency *= layer.octave_lacunarity;
    }

    total / max_amplitude
}

/// Samples a noise layer and remaps it into `[low, high]`.
pub fn evaluate_base_ranged(
    layer: &NoiseLayer,
    perm: &PermutationTable,
    pos: Vec3,
    low: f32,
    high: f32,
) -> f32 {
    let unit = (evaluate_base(layer, perm, pos) * 0.5 + 0.5).clamp(0.0, 1.0);
    low + (high - low) * unit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_reproducibility() {
        let perm = PermutationTable::new(42);
        let layer = NoiseLayer::terrain();
        let pos = Vec3::new(12.5, 3.0, -40.25);

        let a = evaluate_base(&layer, &perm, pos);
        let b = evaluate_base(&layer, &perm, pos);
        assert_eq!(a.to_bits(), b.to_bits(), "Same inputs should produce identical bits");
    }

    #[test]
    fn test_base_range() {
        let perm = PermutationTable::new(1);
        let layer = NoiseLayer::terrain();
        for i in 0..500 {
            let pos = Vec3::new(i as f32 * 3.7, 0.0, i as f32 * -1.3);
            let v = evaluate_base(&layer, &perm, pos);
            assert!((-1.05..=1.05).contains(&v), "Base noise {} outside [-1, 1]", v);
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let layer = NoiseLayer::terrain();
        let pos = Vec3::new(31.0, 7.0, 18.0);
        let a = evaluate_base(&layer, &PermutationTable::new(1), pos);
        let b = evaluate_base(&layer, &PermutationTable::new(2), pos);
        assert_ne!(a, b, "Different permutation tables should give different noise");
    }

    #[test]
    fn test_ranged_stays_in_bounds() {
        let perm = PermutationTable::new(9);
        let layer = NoiseLayer::object();
        for i in 0..300 {
            let pos = Vec3::new(i as f32 * 20.0, 0.0, i as f32 * 13.0);
            let v = evaluate_base_ranged(&layer, &perm, pos, 0.0, 0.99999);
            assert!((0.0..=0.99999).contains(&v), "Ranged value {} escaped bounds", v);
        }
    }

    #[test]
    fn test_validate_rejects_bad_layers() {
        assert!(NoiseLayer::terrain().validate().is_ok());
        let zero_octaves = NoiseLayer { octaves: 0, ..NoiseLayer::terrain() };
        assert!(zero_octaves.validate().is_err());
        let flat = NoiseLayer { octave_lacunarity: 1.0, ..NoiseLayer::terrain() };
        assert!(flat.validate().is_err());
        let loud = NoiseLayer { persistence: 1.5, ..NoiseLayer::terrain() };
        assert!(loud.validate().is_err());
    }
}
