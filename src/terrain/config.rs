//! Generator configuration.
//!
//! Both configs deserialize from JSON with every field optional; missing
//! fields take the defaults below.

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::mesh::MeshBudget;
use crate::noise::{NoiseConfig, PlanetShell};
use crate::streaming::{CullMode, CullPolicy, FillMode, GridConfig, LodConfig};

/// Automatic regeneration on a timer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegenSchedule {
    pub enabled: bool,
    /// Seconds of accumulated tick time between regenerations.
    pub interval: f32,
}

impl Default for RegenSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 1.0,
        }
    }
}

impl RegenSchedule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && !(self.interval > 0.0) {
            return Err(ConfigError::invalid("regen.interval", "must be positive"));
        }
        Ok(())
    }
}

/// Heightmapped terrain tiles on a flat plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatTerrainConfig {
    pub seed: u64,
    /// Half size of one tile; tiles are spaced `2 * tile_size.x` apart.
    pub tile_size: Vec3,
    /// Tiles per horizontal axis around the tracked point.
    pub view_distance: u32,
    /// Heightmap cells per side; the heightmap has one more sample.
    pub mesh_samples: usize,
    /// Alphamap texels per side.
    pub splat_samples: usize,
    /// Slope in degrees at which the cliff layer takes over completely.
    pub slope_angle: f32,
    /// Terrain layer names; layer 0 is the cliff layer.
    pub terrain_layers: Vec<String>,
    /// Tile content variants, picked per tile by the object noise.
    pub variants: Vec<String>,
    /// Variant used when a requested one is unavailable.
    pub safe_variant: String,
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub cull_policy: CullPolicy,
    pub noise: NoiseConfig,
    pub regen: RegenSchedule,
}

impl Default for FlatTerrainConfig {
    fn default() -> Self {
        Self {
            seed: 15,
            tile_size: Vec3::new(20.0, 8.0, 20.0),
            view_distance: 7,
            mesh_samples: 64,
            splat_samples: 64,
            slope_angle: 45.0,
            terrain_layers: ["Cliff", "Grass", "Dirt", "Sand"].map(String::from).to_vec(),
            variants: vec!["TerrainChunk".to_string()],
            safe_variant: "TerrainChunk".to_string(),
            fill_mode: FillMode::default(),
            cull_mode: CullMode::default(),
            cull_policy: CullPolicy::default(),
            noise: NoiseConfig::default(),
            regen: RegenSchedule::default(),
        }
    }
}

impl FlatTerrainConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parses and validates a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Samples per side of each tile heightmap.
    pub fn heightmap_resolution(&self) -> usize {
        self.mesh_samples + 1
    }

    pub fn layer_count(&self) -> usize {
        self.terrain_layers.len()
    }

    /// Streaming layout: tiles edge to edge on a plane at height zero.
    pub fn grid(&self) -> GridConfig {
        GridConfig {
            offset: self.tile_size.x * 2.0,
            repeat: UVec3::new(self.view_distance, 1, self.view_distance),
            lock_y: Some(0.0),
            cull_mode: self.cull_mode,
            cull_policy: self.cull_policy,
            fill_mode: self.fill_mode,
            cull_radius: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tile_size.min_element() <= 0.0 {
            return Err(ConfigError::invalid("tile_size", "every axis must be positive"));
        }
        if self.view_distance == 0 {
            return Err(ConfigError::invalid("view_distance", "must be at least 1"));
        }
        if self.mesh_samples == 0 {
            return Err(ConfigError::invalid("mesh_samples", "must be at least 1"));
        }
        if self.splat_samples < 2 {
            return Err(ConfigError::invalid("splat_samples", "must be at least 2"));
        }
        if !(self.slope_angle > 0.0) {
            return Err(ConfigError::invalid("slope_angle", "must be positive"));
        }
        if self.terrain_layers.is_empty() {
            return Err(ConfigError::invalid("terrain_layers", "needs at least one layer"));
        }
        self.regen.validate()?;
        self.noise.validate()?;
        self.grid().validate()
    }
}

/// Voxel terrain of a single planet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanetConfig {
    pub seed: u64,
    /// Half size of one cubic cell; cells are spaced `2 * cube_size` apart.
    pub cube_size: f32,
    /// Cells per axis around the tracked point.
    pub render_distance: u32,
    pub shell: PlanetShell,
    /// Isosurface threshold in (0, 1).
    pub surface: f32,
    pub lod: LodConfig,
    pub budget: MeshBudget,
    /// Maximum cells remeshed per tick; unlimited when unset.
    pub remesh_cap: Option<usize>,
    pub variants: Vec<String>,
    pub safe_variant: String,
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub cull_policy: CullPolicy,
    pub noise: NoiseConfig,
    pub regen: RegenSchedule,
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            seed: 15,
            cube_size: 10.0,
            render_distance: 8,
            shell: PlanetShell::default(),
            surface: 0.5,
            lod: LodConfig::default(),
            budget: MeshBudget::default(),
            remesh_cap: None,
            variants: vec!["Chunk3D".to_string()],
            safe_variant: "Chunk3D".to_string(),
            fill_mode: FillMode::default(),
            cull_mode: CullMode::default(),
            cull_policy: CullPolicy::default(),
            noise: NoiseConfig::default(),
            regen: RegenSchedule::default(),
        }
    }
}

impl PlanetConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Distance between neighbouring cell centers.
    pub fn cell_offset(&self) -> f32 {
        self.cube_size * 2.0
    }

    pub fn grid(&self) -> GridConfig {
        GridConfig {
            offset: self.cell_offset(),
            repeat: UVec3::splat(self.render_distance),
            lock_y: None,
            cull_mode: self.cull_mode,
            cull_policy: self.cull_policy,
            fill_mode: self.fill_mode,
            cull_radius: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.cube_size > 0.0) {
            return Err(ConfigError::invalid("cube_size", "must be positive"));
        }
        if self.render_distance == 0 {
            return Err(ConfigError::invalid("render_distance", "must be at least 1"));
        }
        if !(self.surface > 0.0 && self.surface < 1.0) {
            return Err(ConfigError::invalid("surface", "must lie strictly between 0 and 1"));
        }
        if !(self.shell.radius > 0.0) {
            return Err(ConfigError::invalid("shell.radius", "must be positive"));
        }
        if !(self.shell.min_radius < self.shell.max_radius) {
            return Err(ConfigError::invalid("shell.min_radius", "must be below shell.max_radius"));
        }
        if self.budget.vertex_cap < 3 {
            return Err(ConfigError::invalid("budget.vertex_cap", "must hold one triangle"));
        }
        if self.remesh_cap == Some(0) {
            return Err(ConfigError::invalid("remesh_cap", "must be at least 1 when set"));
        }
        self.lod.validate()?;
        self.regen.validate()?;
        self.noise.validate()?;
        self.grid().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FlatTerrainConfig::default().validate().is_ok());
        assert!(PlanetConfig::default().validate().is_ok());
    }

    #[test]
    fn test_flat_grid_layout() {
        let grid = FlatTerrainConfig::default().grid();
        assert_eq!(grid.offset, 40.0);
        assert_eq!(grid.repeat, UVec3::new(7, 1, 7));
        assert_eq!(grid.lock_y, Some(0.0));
        assert_eq!(FlatTerrainConfig::default().heightmap_resolution(), 65);
    }

    #[test]
    fn test_planet_grid_layout() {
        let grid = PlanetConfig::default().grid();
        assert_eq!(grid.offset, 20.0);
        assert_eq!(grid.repeat, UVec3::splat(8));
        assert_eq!(grid.lock_y, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = FlatTerrainConfig::from_json(r#"{ "seed": 99, "view_distance": 3 }"#).unwrap();
        assert_eq!(config.seed, 99);
        assert_eq!(config.view_distance, 3);
        assert_eq!(config.tile_size, Vec3::new(20.0, 8.0, 20.0));
    }

    #[test]
    fn test_json_validation_errors() {
        assert!(matches!(
            PlanetConfig::from_json(r#"{ "surface": 1.5 }"#),
            Err(ConfigError::Invalid { field: "surface", .. })
        ));
        assert!(matches!(
            PlanetConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_regen_interval_checked_when_enabled() {
        let mut config = FlatTerrainConfig::default();
        config.regen = RegenSchedule {
            enabled: true,
            interval: 0.0,
        };
        assert!(config.validate().is_err());
    }
}
