//! Eroded fractal noise ("uber" noise) and its randomized populations.
//!
//! Each octave is shaped by a sharpness blend between billowed and ridged
//! noise, then attenuated by erosion terms accumulated from the octaves
//! before it: slope erosion damps detail on steep ground, ridge erosion
//! damps the amplitude that follows sharp creases, and altitude erosion
//! damps detail at low elevations. Octaves therefore run strictly in order.

use glam::Vec3;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::permutation::PermutationTable;
use super::simplex::simplex3_with_derivative;
use crate::error::ConfigError;

/// Parameters of one eroded fractal noise field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErosionParams {
    /// Number of octaves.
    pub octaves: u32,
    /// Domain warp strength along the accumulated gradient.
    pub perturb: f32,
    /// Feature shape in [-1, 1]: negative billows, positive ridges.
    pub sharpness: f32,
    /// Exaggeration of strong features.
    pub amplify: f32,
    /// Detail damping at low altitude.
    pub altitude_erosion: f32,
    /// Amplitude damping after sharp ridges.
    pub ridge_erosion: f32,
    /// Detail damping on steep slopes.
    pub slope_erosion: f32,
    /// Frequency multiplier per octave, above 1.
    pub lacunarity: f32,
    /// Amplitude multiplier per octave, in (0, 1).
    pub gain: f32,
    /// Amplitude of the first octave.
    pub start_amplitude: f32,
    /// Frequency of the first octave.
    pub scale: f32,
}

impl Default for ErosionParams {
    fn default() -> Self {
        Self {
            octaves: 6,
            perturb: 0.1,
            sharpness: 0.2,
            amplify: 0.1,
            altitude_erosion: 0.1,
            ridge_erosion: 0.4,
            slope_erosion: 0.5,
            lacunarity: 2.0,
            gain: 0.5,
            start_amplitude: 1.0,
            scale: 0.001,
        }
    }
}

impl ErosionParams {
    /// Lower bounds used when sampling variant populations.
    pub fn lower_bound() -> Self {
        Self {
            octaves: 4,
            perturb: -0.4,
            sharpness: -1.0,
            amplify: 0.0,
            altitude_erosion: 0.0,
            ridge_erosion: 0.0,
            slope_erosion: 0.0,
            lacunarity: 1.1,
            gain: 0.2,
            start_amplitude: 0.1,
            scale: 0.0005,
        }
    }

    /// Upper bounds used when sampling variant populations.
    pub fn upper_bound() -> Self {
        Self {
            octaves: 4,
            perturb: 0.4,
            sharpness: 1.0,
            amplify: 0.5,
            altitude_erosion: 0.25,
            ridge_erosion: 1.0,
            slope_erosion: 1.0,
            lacunarity: 2.5,
            gain: 0.8,
            start_amplitude: 3.0,
            scale: 0.0016,
        }
    }

    /// Checks the parameter ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.octaves == 0 {
            return Err(ConfigError::invalid("octaves", "must be at least 1"));
        }
        if !(self.lacunarity > 1.0) {
            return Err(ConfigError::invalid("lacunarity", "must exceed 1"));
        }
        if !(self.gain > 0.0 && self.gain < 1.0) {
            return Err(ConfigError::invalid("gain", "must be in (0, 1)"));
        }
        if !(self.start_amplitude > 0.0) {
            return Err(ConfigError::invalid("start_amplitude", "must be positive"));
        }
        if !(self.scale > 0.0) {
            return Err(ConfigError::invalid("scale", "must be positive"));
        }
        Ok(())
    }

    /// Sum of octave amplitudes without erosion, used for normalization.
    fn amplitude_budget(&self) -> f32 {
        let mut amplitude = self.start_amplitude;
        let mut total = 0.0;
        for _ in 0..self.octaves.max(1) {
            total += amplitude;
            amplitude *= self.gain;
        }
        total.max(f32::EPSILON)
    }
}

/// Samples eroded fractal noise at a position.
///
/// # Arguments
/// * `params` - Erosion parameters
/// * `perm` - Permutation table of the active seed
/// * `pos` - World-space sample position
///
/// # Returns
/// A value in approximately [-1, 1]
pub fn evaluate_erosion(params: &ErosionParams, perm: &PermutationTable, pos: Vec3) -> f32 {
    let mut sum = 0.0f32;
    let mut frequency = params.scale;
    let mut amplitude = params.start_amplitude;
    let mut damped_amplitude = amplitude;
    let mut slope_sum = Vec3::ZERO;
    let mut ridge_sum = Vec3::ZERO;
    let mut warp = Vec3::ZERO;
    let budget = params.amplitude_budget();

    for _ in 0..params.octaves.max(1) {
        let (n, dn) = simplex3_with_derivative(perm, (pos + warp) * frequency);
        let (shaped, d_shaped) = shape_feature(n, dn, params.sharpness);

        slope_sum += d_shaped * params.slope_erosion;
        ridge_sum += d_shaped * params.ridge_erosion;

        sum += damped_amplitude * shaped / (1.0 + slope_sum.length_squared());
        warp += d_shaped * (params.perturb * damped_amplitude);

        let altitude = smoothstep(-1.0, 1.0, sum / budget);
        let gain = params.gain * (1.0 - params.altitude_erosion * (1.0 - altitude));
        amplitude *= gain;

        let ridge = ridge_sum.length_squared();
        damped_amplitude = amplitude * (1.0 - params.ridge_erosion * ridge / (1.0 + ridge));
        frequency *= params.lacunarity;
    }

    let normalized = sum / budget;
    normalized * (1.0 + params.amplify * normalized.abs())
}

/// Blends raw noise toward billows or ridges according to `sharpness`.
fn shape_feature(n: f32, dn: Vec3, sharpness: f32) -> (f32, Vec3) {
    let sign = if n < 0.0 { -1.0 } else { 1.0 };
    let (target, d_target) = if sharpness >= 0.0 {
        (1.0 - 2.0 * n.abs(), dn * (-2.0 * sign))
    } else {
        (2.0 * n.abs() - 1.0, dn * (2.0 * sign))
    };
    let t = sharpness.abs().min(1.0);
    (n + (target - n) * t, dn + (d_target - dn) * t)
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// How the primary field and its variants are merged per sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErosionBlend {
    /// Strongest field wins.
    #[default]
    Max,
    /// Plain average of all fields.
    Mean,
}

/// Bounds for sampling a population of erosion variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErosionBounds {
    /// Per-parameter lower bounds.
    pub min: ErosionParams,
    /// Per-parameter upper bounds.
    pub max: ErosionParams,
    /// Octave count of every sampled variant.
    pub octaves: u32,
    /// Number of variants sampled per regeneration.
    pub variants: usize,
}

impl Default for ErosionBounds {
    fn default() -> Self {
        Self {
            min: ErosionParams::lower_bound(),
            max: ErosionParams::upper_bound(),
            octaves: 4,
            variants: 20,
        }
    }
}

impl ErosionBounds {
    /// Samples `variants` parameter sets uniformly between the bounds.
    ///
    /// The generator is threaded explicitly so populations reproduce for a
    /// given seed regardless of what else consumed randomness.
    pub fn sample(&self, rng: &mut ChaCha8Rng) -> Vec<ErosionParams> {
        (0..self.variants).map(|_| self.sample_one(rng)).collect()
    }

    fn sample_one(&self, rng: &mut ChaCha8Rng) -> ErosionParams {
        let (lo, hi) = (&self.min, &self.max);
        let mut pick = |a: f32, b: f32| {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            if high > low {
                rng.gen_range(low..high)
            } else {
                low
            }
        };
        ErosionParams {
            octaves: self.octaves.max(1),
            perturb: pick(lo.perturb, hi.perturb),
            sharpness: pick(lo.sharpness, hi.sharpness),
            amplify: pick(lo.amplify, hi.amplify),
            altitude_erosion: pick(lo.altitude_erosion, hi.altitude_erosion),
            ridge_erosion: pick(lo.ridge_erosion, hi.ridge_erosion),
            slope_erosion: pick(lo.slope_erosion, hi.slope_erosion),
            lacunarity: pick(lo.lacunarity, hi.lacunarity),
            gain: pick(lo.gain, hi.gain),
            start_amplitude: pick(lo.start_amplitude, hi.start_amplitude),
            scale: pick(lo.scale, hi.scale),
        }
    }

    /// Checks that every sampled variant would be valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let corners = [
            ErosionParams { octaves: self.octaves, ..self.min },
            ErosionParams { octaves: self.octaves, ..self.max },
        ];
        for corner in &corners {
            corner.validate()?;
        }
        Ok(())
    }
}

/// Evaluates a primary field and its variants and merges them.
pub fn evaluate_population(
    primary: &ErosionParams,
    variants: &[ErosionParams],
    blend: ErosionBlend,
    perm: &PermutationTable,
    pos: Vec3,
) -> f32 {
    let first = evaluate_erosion(primary, perm, pos);
    let rest = variants.iter().map(|params| evaluate_erosion(params, perm, pos));
    match blend {
        ErosionBlend::Max => rest.fold(first, f32::max),
        ErosionBlend::Mean => {
            let total: f32 = rest.sum::<f32>() + first;
            total / (variants.len() + 1) as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_erosion_deterministic() {
        let perm = PermutationTable::new(15);
        let params = ErosionParams::default();
        let pos = Vec3::new(1500.0, 0.0, -820.0);
        let a = evaluate_erosion(&params, &perm, pos);
        let b = evaluate_erosion(&params, &perm, pos);
        assert_eq!(a.to_bits(), b.to_bits(), "Erosion noise must be bit-identical");
    }

    #[test]
    fn test_erosion_bounded() {
        let perm = PermutationTable::new(3);
        let params = ErosionParams::default();
        for i in 0..400 {
            let pos = Vec3::new(i as f32 * 97.0, 0.0, i as f32 * -61.0);
            let v = evaluate_erosion(&params, &perm, pos);
            assert!(v.is_finite(), "Erosion noise must be finite");
            assert!(v.abs() <= 1.0 + params.amplify + 0.05, "Erosion value {} too large", v);
        }
    }

    #[test]
    fn test_slope_erosion_damps_detail() {
        let perm = PermutationTable::new(21);
        let smooth = ErosionParams { slope_erosion: 0.0, ridge_erosion: 0.0, ..Default::default() };
        let eroded = ErosionParams { slope_erosion: 1.0, ..smooth };

        let spread = |params: &ErosionParams| {
            let samples: Vec<f32> = (0..300)
                .map(|i| evaluate_erosion(params, &perm, Vec3::new(i as f32 * 37.0, 0.0, i as f32 * 11.0)))
                .collect();
            samples.iter().map(|v| v * v).sum::<f32>() / samples.len() as f32
        };
        assert!(
            spread(&eroded) < spread(&smooth),
            "Slope erosion should lower the signal energy"
        );
    }

    #[test]
    fn test_population_sampling_reproducible() {
        let bounds = ErosionBounds::default();
        let a = bounds.sample(&mut ChaCha8Rng::seed_from_u64(15));
        let b = bounds.sample(&mut ChaCha8Rng::seed_from_u64(15));
        assert_eq!(a, b, "Same seed should sample the same population");
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn test_population_within_bounds() {
        let bounds = ErosionBounds::default();
        let population = bounds.sample(&mut ChaCha8Rng::seed_from_u64(4));
        for params in &population {
            assert_eq!(params.octaves, 4);
            assert!((bounds.min.gain..=bounds.max.gain).contains(&params.gain));
            assert!((bounds.min.scale..=bounds.max.scale).contains(&params.scale));
            assert!((bounds.min.sharpness..=bounds.max.sharpness).contains(&params.sharpness));
            assert!(params.validate().is_ok(), "Sampled variant should be valid: {:?}", params);
        }
    }

    #[test]
    fn test_population_max_blend_dominates_primary() {
        let perm = PermutationTable::new(8);
        let primary = ErosionParams::default();
        let variants = ErosionBounds::default().sample(&mut ChaCha8Rng::seed_from_u64(8));
        let pos = Vec3::new(400.0, 0.0, 900.0);
        let merged = evaluate_population(&primary, &variants, ErosionBlend::Max, &perm, pos);
        assert!(merged >= evaluate_erosion(&primary, &perm, pos));
    }

    #[test]
    fn test_population_mean_blend_averages_all_fields() {
        let perm = PermutationTable::new(8);
        let primary = ErosionParams::default();
        let variants = ErosionBounds::default().sample(&mut ChaCha8Rng::seed_from_u64(8));
        for i in 0..20 {
            let pos = Vec3::new(i as f32 * 131.0, 0.0, i as f32 * -57.0);
            let values: Vec<f32> = std::iter::once(&primary)
                .chain(&variants)
                .map(|params| evaluate_erosion(params, &perm, pos))
                .collect();
            let expected = values.iter().map(|&v| f64::from(v)).sum::<f64>() / values.len() as f64;

            let merged = evaluate_population(&primary, &variants, ErosionBlend::Mean, &perm, pos);
            assert!(
                (f64::from(merged) - expected).abs() < 1e-5,
                "Mean blend at {} should be {} but was {}",
                pos,
                expected,
                merged
            );
            let max = evaluate_population(&primary, &variants, ErosionBlend::Max, &perm, pos);
            assert!(merged <= max, "Mean {} cannot exceed max {}", merged, max);
        }
    }

    #[test]
    fn test_population_mean_without_variants_is_primary() {
        let perm = PermutationTable::new(2);
        let primary = ErosionParams::default();
        let pos = Vec3::new(-300.0, 0.0, 75.0);
        let merged = evaluate_population(&primary, &[], ErosionBlend::Mean, &perm, pos);
        assert_eq!(merged, evaluate_erosion(&primary, &perm, pos));
    }

    #[test]
    fn test_bounds_validation() {
        assert!(ErosionBounds::default().validate().is_ok());
        let bad = ErosionBounds { octaves: 0, ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
