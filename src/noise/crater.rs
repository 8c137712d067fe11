//! Crater overlay applied to a banded range of base values.

use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

use super::layer::{evaluate_base, NoiseLayer};
use super::permutation::PermutationTable;
use crate::error::ConfigError;

/// Smallest blend weight inside the band.
const MIN_WEIGHT: f32 = 1e-3;
/// Largest blend weight inside the band.
const MAX_WEIGHT: f32 = 1.0 - 1e-3;

/// Crater overlay parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CraterOverlay {
    /// Depth of the bowl below the lower band edge.
    pub effect: f32,
    /// Crater noise level around which craters switch on.
    pub threshold: f32,
    /// Domain warp applied to the crater noise.
    pub warp_amount: f32,
    /// Channel weights: noise, inverted noise, warped noise, constant.
    pub composite: Vec4,
    /// Noise that places craters.
    pub noise: NoiseLayer,
    /// Lower edge of the affected band.
    pub min: f32,
    /// Upper edge of the affected band.
    pub max: f32,
    /// Rim sharpness in (0, 1).
    pub lip: f32,
}

impl Default for CraterOverlay {
    fn default() -> Self {
        Self {
            effect: 0.1,
            threshold: 0.5,
            warp_amount: 0.0,
            composite: Vec4::new(1.0, 0.0, 0.0, 1.0),
            noise: NoiseLayer::crater(),
            min: 0.141,
            max: 0.411,
            lip: 0.559,
        }
    }
}

impl CraterOverlay {
    /// Checks the parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.noise.validate()?;
        if self.min > self.max {
            return Err(ConfigError::invalid("crater.min", "must not exceed crater.max"));
        }
        if !(self.lip > 0.0 && self.lip < 1.0) {
            return Err(ConfigError::invalid("crater.lip", "must be in (0, 1)"));
        }
        if !(self.effect > 0.0) {
            return Err(ConfigError::invalid("crater.effect", "must be positive"));
        }
        Ok(())
    }

    /// Crater presence mask in [0, 1] at a position.
    fn mask(&self, perm: &PermutationTable, pos: Vec3) -> f32 {
        let unit = |v: f32| (v * 0.5 + 0.5).clamp(0.0, 1.0);
        let raw = unit(evaluate_base(&self.noise, perm, pos));
        let warp = Vec3::splat(self.warp_amount * (raw - 0.5));
        let warped = unit(evaluate_base(&self.noise, perm, pos + warp * 100.0));

        let channels = Vec4::new(raw, 1.0 - raw, warped, 1.0);
        let weight = self.composite.abs().dot(Vec4::ONE);
        let blended = if weight > 0.0 {
            self.composite.abs().dot(channels) / weight
        } else {
            raw
        };
        smoothstep(self.threshold - 0.5, self.threshold + 0.5, blended)
    }
}

/// Applies the crater overlay to a base value.
///
/// Values outside `[min, max]` pass through untouched. Values inside the
/// band move toward a bowl profile that always lies below them, weighted by
/// `lip` and the local crater mask, so the result lies strictly between
/// the input and the profile.
///
/// # Arguments
/// * `overlay` - Crater parameters
/// * `base` - Value being overlaid
/// * `perm` - Permutation table of the active seed
/// * `pos` - World-space sample position
pub fn evaluate_crater(
    overlay: &CraterOverlay,
    base: f32,
    perm: &PermutationTable,
    pos: Vec3,
) -> f32 {
    if base < overlay.min || base > overlay.max {
        return base;
    }
    let profile = rim_profile(overlay, base);
    let weight = crater_weight(overlay, perm, pos);
    base + (profile - base) * weight
}

/// Bowl profile for a value inside the band; deepest at the lower edge.
pub fn rim_profile(overlay: &CraterOverlay, base: f32) -> f32 {
    let band = (overlay.max - overlay.min).max(f32::EPSILON);
    let u = ((base - overlay.min) / band).clamp(0.0, 1.0);
    let depth = overlay.effect.abs().max(1e-4);
    overlay.min - depth * (1.0 - u * u)
}

fn crater_weight(overlay: &CraterOverlay, perm: &PermutationTable, pos: Vec3) -> f32 {
    let lip = overlay.lip.clamp(MIN_WEIGHT, MAX_WEIGHT);
    let mask = overlay.mask(perm, pos);
    (MIN_WEIGHT + (lip - MIN_WEIGHT) * mask).clamp(MIN_WEIGHT, MAX_WEIGHT)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}
