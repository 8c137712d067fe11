//! The published noise parameter set for one seed.

use std::sync::Arc;

use glam::Vec3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::crater::{evaluate_crater, CraterOverlay};
use super::layer::{evaluate_base, evaluate_base_ranged, NoiseLayer};
use super::permutation::PermutationTable;
use super::uber::{evaluate_erosion, evaluate_population, ErosionBlend, ErosionBounds, ErosionParams};
use crate::error::ConfigError;

/// Upper bound used when mapping noise onto variant indices.
const VARIANT_CEILING: f32 = 0.99999;

/// Position offset between successive splat layers.
const SPLAT_LAYER_OFFSET: Vec3 = Vec3::new(173.0, 0.0, 311.0);

/// Every noise parameter a generator uses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Base layer for heights and densities.
    pub height: NoiseLayer,
    /// Base layer for terrain-layer weights.
    pub splat: NoiseLayer,
    /// Layer used to pick tile variants.
    pub object: NoiseLayer,
    /// Primary erosion field for heights and densities.
    pub height_erosion: ErosionParams,
    /// Primary erosion field for terrain-layer weights.
    pub splat_erosion: ErosionParams,
    /// Bounds for the sampled variant population.
    pub variant_bounds: ErosionBounds,
    /// How the primary field and its variants merge.
    pub blend: ErosionBlend,
    /// Crater overlay.
    pub crater: CraterOverlay,
    /// Whether the crater overlay is applied.
    pub craters_enabled: bool,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            height: NoiseLayer::terrain(),
            splat: NoiseLayer::splat(),
            object: NoiseLayer::object(),
            height_erosion: ErosionParams::default(),
            splat_erosion: ErosionParams {
                octaves: 4,
                scale: 0.002,
                ..ErosionParams::default()
            },
            variant_bounds: ErosionBounds::default(),
            blend: ErosionBlend::Max,
            crater: CraterOverlay::default(),
            craters_enabled: true,
        }
    }
}

impl NoiseConfig {
    /// Checks every contained parameter set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.height.validate()?;
        self.splat.validate()?;
        self.object.validate()?;
        self.height_erosion.validate()?;
        self.splat_erosion.validate()?;
        self.variant_bounds.validate()?;
        self.crater.validate()
    }
}

/// Radial shell that a planet surface lives in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanetShell {
    /// Planet centre in world space.
    pub center: Vec3,
    /// Planet radius in world units.
    pub radius: f32,
    /// Lowest surface, as a fraction of `radius`.
    pub min_radius: f32,
    /// Highest surface, as a fraction of `radius`.
    pub max_radius: f32,
}

impl Default for PlanetShell {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            radius: 100.0,
            min_radius: 0.7,
            max_radius: 0.95,
        }
    }
}

/// Immutable noise state for one seed.
///
/// A model is fully built before it is shared, and is never mutated
/// afterwards. Regeneration builds a new model and swaps the `Arc`.
#[derive(Debug, Clone)]
pub struct NoiseModel {
    seed: u64,
    perm: Arc<PermutationTable>,
    config: NoiseConfig,
    variants: Vec<ErosionParams>,
}

impl NoiseModel {
    /// Builds the model for a seed.
    ///
    /// The permutation table and the erosion variants come from one
    /// `ChaCha8Rng` seeded with `seed`, in that order.
    pub fn build(config: &NoiseConfig, seed: u64) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let perm = PermutationTable::from_rng(&mut rng);
        let variants = config.variant_bounds.sample(&mut rng);
        Ok(Arc::new(Self {
            seed,
            perm: Arc::new(perm),
            config: config.clone(),
            variants,
        }))
    }

    /// Reassembles a model from parts uploaded to a backend.
    pub fn from_parts(
        seed: u64,
        perm: PermutationTable,
        config: NoiseConfig,
        variants: Vec<ErosionParams>,
    ) -> Self {
        Self {
            seed,
            perm: Arc::new(perm),
            config,
            variants,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn permutation(&self) -> &Arc<PermutationTable> {
        &self.perm
    }

    pub fn config(&self) -> &NoiseConfig {
        &self.config
    }

    pub fn variants(&self) -> &[ErosionParams] {
        &self.variants
    }

    /// Terrain surface height in [0, 1] at a position.
    pub fn surface_height(&self, pos: Vec3) -> f32 {
        let cfg = &self.config;
        let base = evaluate_base(&cfg.height, &self.perm, pos);
        let eroded = evaluate_population(
            &cfg.height_erosion,
            &self.variants,
            cfg.blend,
            &self.perm,
            pos,
        );
        let height = (0.5 + 0.25 * (base + eroded)).clamp(0.0, 1.0);
        let height = if cfg.craters_enabled {
            evaluate_crater(&cfg.crater, height, &self.perm, pos)
        } else {
            height
        };
        height.clamp(0.0, 1.0)
    }

    /// Raw weight in [0, 1] of terrain layer `layer` at a position.
    pub fn splat_weight(&self, pos: Vec3, layer: u32) -> f32 {
        let p = pos + SPLAT_LAYER_OFFSET * layer as f32;
        let base = evaluate_base(&self.config.splat, &self.perm, p);
        let eroded = evaluate_erosion(&self.config.splat_erosion, &self.perm, p);
        (0.5 + 0.25 * (base + eroded)).clamp(0.0, 1.0)
    }

    /// Solid density in [0, 1] of a planet at a position.
    ///
    /// Density crosses 0.5 exactly at the noise-displaced surface radius.
    pub fn planet_density(&self, pos: Vec3, shell: &PlanetShell) -> f32 {
        let offset = pos - shell.center;
        let radius = shell.radius.max(f32::EPSILON);
        let r = offset.length() / radius;
        let direction = offset.try_normalize().unwrap_or(Vec3::X);

        let height = self.surface_height(shell.center + direction * radius);
        let span = (shell.max_radius - shell.min_radius).max(f32::EPSILON);
        let surface = shell.min_radius + span * height;
        (0.5 + (surface - r) / span).clamp(0.0, 1.0)
    }

    /// Picks one of `count` variants for a cell position.
    pub fn variant_index(&self, pos: Vec3, count: usize) -> usize {
        if count <= 1 {
            return 0;
        }
        let v = evaluate_base_ranged(&self.config.object, &self.perm, pos, 0.0, VARIANT_CEILING);
        ((v * count as f32) as usize).min(count - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_reproducible() {
        let config = NoiseConfig::default();
        let a = NoiseModel::build(&config, 15).unwrap();
        let b = NoiseModel::build(&config, 15).unwrap();
        assert_eq!(a.permutation(), b.permutation());
        assert_eq!(a.variants(), b.variants());

        let pos = Vec3::new(120.0, 0.0, -64.0);
        assert_eq!(a.surface_height(pos).to_bits(), b.surface_height(pos).to_bits());
    }

    #[test]
    fn test_new_seed_builds_new_model() {
        let config = NoiseConfig::default();
        let a = NoiseModel::build(&config, 1).unwrap();
        let b = NoiseModel::build(&config, 2).unwrap();
        assert_ne!(a.permutation(), b.permutation());
        assert_ne!(a.variants(), b.variants());
    }

    #[test]
    fn test_surface_height_range() {
        let model = NoiseModel::build(&NoiseConfig::default(), 3).unwrap();
        for i in 0..200 {
            let h = model.surface_height(Vec3::new(i as f32 * 40.0, 0.0, i as f32 * 25.0));
            assert!((0.0..=1.0).contains(&h), "Height {} outside [0, 1]", h);
        }
    }

    #[test]
    fn test_planet_density_inside_and_outside() {
        let model = NoiseModel::build(&NoiseConfig::default(), 3).unwrap();
        let shell = PlanetShell::default();
        assert_eq!(model.planet_density(shell.center, &shell), 1.0, "Core must be solid");
        let far = shell.center + Vec3::new(0.0, shell.radius * 2.0, 0.0);
        assert_eq!(model.planet_density(far, &shell), 0.0, "Space must be empty");
    }

    #[test]
    fn test_variant_index_in_range() {
        let model = NoiseModel::build(&NoiseConfig::default(), 5).unwrap();
        for i in 0..100 {
            let pos = Vec3::new(i as f32 * 40.0, 0.0, -(i as f32) * 40.0);
            assert!(model.variant_index(pos, 3) < 3);
        }
        assert_eq!(model.variant_index(Vec3::ONE, 1), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = NoiseConfig::default();
        config.height.octaves = 0;
        assert!(NoiseModel::build(&config, 1).is_err());
    }
}
