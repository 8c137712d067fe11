//! Heightmapped terrain tiles.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use log::debug;

use super::config::FlatTerrainConfig;
use super::diagnostics::ConfigDump;
use super::error::TerrainError;
use super::session::{Session, SessionParts};
use super::splat::blend_alphamaps;
use crate::field::{ComputeBackend, FieldEvaluator, HeightField, SplatField};
use crate::noise::NoiseModel;
use crate::streaming::{CellKey, Instantiator, StreamingGrid, TickReport};

/// Renderable data of one terrain tile.
#[derive(Debug, Clone)]
pub struct HeightTile {
    pub center: Vec3,
    /// Heights in [0, 1], scaled by `2 * tile_size.y` in world space.
    pub heights: HeightField,
    /// Normalized terrain-layer weights.
    pub alphamaps: SplatField,
}

impl HeightTile {
    /// Whether either field was produced under a configuration mismatch.
    pub fn is_dirty(&self) -> bool {
        self.heights.is_dirty() || self.alphamaps.is_dirty()
    }
}

/// Streams heightmapped tiles around a tracked point on a flat plane.
pub struct FlatTerrain<B: ComputeBackend, I: Instantiator> {
    config: FlatTerrainConfig,
    session: Session<B, I>,
    tiles: HashMap<CellKey, HeightTile>,
}

impl<B: ComputeBackend, I: Instantiator> FlatTerrain<B, I> {
    /// Validates the config, resolves variants and publishes the first model.
    pub fn new(config: FlatTerrainConfig, backend: B, instantiator: I) -> Result<Self, TerrainError> {
        config.validate()?;
        let session = Session::new(
            SessionParts {
                seed: config.seed,
                noise: &config.noise,
                grid: config.grid(),
                variants: &config.variants,
                safe_variant: &config.safe_variant,
                regen: config.regen,
            },
            backend,
            instantiator,
        )?;
        Ok(Self {
            config,
            session,
            tiles: HashMap::new(),
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &FlatTerrainConfig {
        &self.config
    }

    /// Seed of the current generation.
    pub fn seed(&self) -> u64 {
        self.session.seed
    }

    /// Noise model built from the current seed.
    pub fn model(&self) -> &Arc<NoiseModel> {
        &self.session.model
    }

    /// The streaming grid that decides which tiles exist.
    pub fn grid(&self) -> &StreamingGrid<I> {
        &self.session.grid
    }

    /// The field evaluator tiles are sampled through.
    pub fn evaluator(&self) -> &FieldEvaluator<B> {
        &self.session.evaluator
    }

    /// Tile data of a streamed cell.
    pub fn tile(&self, key: CellKey) -> Option<&HeightTile> {
        self.tiles.get(&key)
    }

    /// Number of tiles holding data.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Advances streaming by one step.
    ///
    /// # Arguments
    /// * `dt` - Seconds since the previous tick, for timed regeneration
    /// * `tracked` - World position the tiles follow
    pub fn tick(&mut self, dt: f32, tracked: Vec3) -> Result<TickReport, TerrainError> {
        if self.session.timer.advance(dt) {
            self.regenerate()?;
        }
        let report = self.session.grid.tick(tracked, &self.session.model);
        for key in &report.destroyed {
            self.tiles.remove(key);
        }
        for key in self.untiled_cells(tracked) {
            let center = self.session.grid.position_of(key);
            let tile = self.generate_tile(center)?;
            self.tiles.insert(key, tile);
        }
        Ok(report)
    }

    /// Active cells without tile data, nearest to `tracked` first.
    ///
    /// Covers cells spawned this tick as well as cells whose generation
    /// failed on an earlier tick.
    fn untiled_cells(&self, tracked: Vec3) -> Vec<CellKey> {
        let grid = &self.session.grid;
        let mut keys: Vec<CellKey> = grid
            .active_cells()
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| !self.tiles.contains_key(key))
            .collect();
        keys.sort_by(|a, b| {
            let da = grid.position_of(*a).distance_squared(tracked);
            let db = grid.position_of(*b).distance_squared(tracked);
            da.total_cmp(&db).then_with(|| a.cmp(b))
        });
        keys
    }

    /// Samples heights and alphamaps for a tile centered at `center`.
    pub fn generate_tile(&mut self, center: Vec3) -> Result<HeightTile, TerrainError> {
        let half = self.config.tile_size;
        let (start, end) = (center - half, center + half);
        let heights = self
            .session
            .evaluator
            .heights(start, end, self.config.heightmap_resolution())?;
        let raw = self.session.evaluator.splats(
            start,
            end,
            self.config.splat_samples,
            self.config.layer_count(),
        )?;
        let alphamaps = blend_alphamaps(&raw, &heights, half * 2.0, self.config.slope_angle);
        debug!("Generated tile at {}", center);
        Ok(HeightTile {
            center,
            heights,
            alphamaps,
        })
    }

    /// Switches to `seed`, clearing every tile.
    pub fn set_seed(&mut self, seed: u64) -> Result<(), TerrainError> {
        self.session.reseed(seed)?;
        self.config.seed = seed;
        self.tiles.clear();
        Ok(())
    }

    /// Switches to the following seed.
    pub fn next_seed(&mut self) -> Result<(), TerrainError> {
        self.set_seed(self.session.seed.wrapping_add(1))
    }

    /// Switches to the preceding seed.
    pub fn previous_seed(&mut self) -> Result<(), TerrainError> {
        self.set_seed(self.session.seed.wrapping_sub(1))
    }

    /// Rebuilds the current seed from scratch.
    pub fn regenerate(&mut self) -> Result<(), TerrainError> {
        self.set_seed(self.session.seed)
    }

    /// Snapshot of the effective configuration.
    pub fn dump(&self) -> ConfigDump {
        ConfigDump::flat(&self.config, &self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::cpu::CpuBackend;
    use crate::streaming::testing::RecordingInstantiator;
    use crate::streaming::{CellState, FillMode};

    fn small_config() -> FlatTerrainConfig {
        FlatTerrainConfig {
            view_distance: 3,
            mesh_samples: 8,
            splat_samples: 6,
            fill_mode: FillMode::All,
            ..Default::default()
        }
    }

    fn terrain(config: FlatTerrainConfig) -> FlatTerrain<CpuBackend, RecordingInstantiator> {
        let inst = RecordingInstantiator::with_variants(&["TerrainChunk"]);
        FlatTerrain::new(config, CpuBackend::new(), inst).unwrap()
    }

    #[test]
    fn test_tick_spawns_tiles_with_data() {
        let mut t = terrain(small_config());
        let report = t.tick(0.016, Vec3::ZERO).unwrap();
        assert_eq!(report.spawned.len(), 5);
        assert_eq!(t.tile_count(), 5);

        let tile = t.tile(CellKey::ORIGIN).unwrap();
        assert!(!tile.is_dirty());
        assert_eq!(tile.heights.size(), 9);
        assert_eq!(tile.alphamaps.size(), 6);
        assert_eq!(tile.alphamaps.layers(), 4);
        let (lo, hi) = tile.heights.height_range();
        assert!(lo >= 0.0 && hi <= 1.0);
    }

    #[test]
    fn test_neighbouring_tiles_share_edges() {
        let mut t = terrain(small_config());
        t.tick(0.0, Vec3::ZERO).unwrap();
        let left = t.tile(CellKey::ORIGIN).unwrap();
        let right = t.tile(CellKey::new(1, 0, 0)).unwrap();
        let last = left.heights.size() - 1;
        for z in 0..=last {
            let a = left.heights.get(last, z);
            let b = right.heights.get(0, z);
            assert!((a - b).abs() < 1e-5, "Seam mismatch at row {}: {} vs {}", z, a, b);
        }
    }

    #[test]
    fn test_same_seed_reproduces_tiles() {
        let mut a = terrain(small_config());
        let mut b = terrain(small_config());
        let ta = a.generate_tile(Vec3::new(80.0, 0.0, -40.0)).unwrap();
        let tb = b.generate_tile(Vec3::new(80.0, 0.0, -40.0)).unwrap();
        assert_eq!(ta.heights, tb.heights);
        assert_eq!(ta.alphamaps, tb.alphamaps);
    }

    #[test]
    fn test_seed_change_clears_everything() {
        let mut t = terrain(small_config());
        t.tick(0.0, Vec3::ZERO).unwrap();
        let before = t.generate_tile(Vec3::ZERO).unwrap();

        t.next_seed().unwrap();
        assert_eq!(t.seed(), 16);
        assert_eq!(t.tile_count(), 0);
        assert!(t.grid().is_empty());
        assert_eq!(t.grid().state(CellKey::ORIGIN), CellState::Absent);
        assert_eq!(t.model().seed(), 16);

        let after = t.generate_tile(Vec3::ZERO).unwrap();
        assert_ne!(before.heights, after.heights, "A new seed must change the terrain");

        t.previous_seed().unwrap();
        let again = t.generate_tile(Vec3::ZERO).unwrap();
        assert_eq!(before.heights, again.heights, "Returning to a seed must reproduce it");
    }

    #[test]
    fn test_auto_regeneration() {
        let mut config = small_config();
        config.regen.enabled = true;
        config.regen.interval = 1.0;
        let mut t = terrain(config);
        t.tick(0.6, Vec3::ZERO).unwrap();
        assert_eq!(t.grid().instantiator().destroyed.len(), 0);
        let report = t.tick(0.6, Vec3::ZERO).unwrap();
        assert_eq!(t.grid().instantiator().destroyed.len(), 5, "Regeneration clears old tiles");
        assert_eq!(report.spawned.len(), 5, "Tiles are rebuilt in the same tick");
    }

    #[test]
    fn test_failed_tiles_are_retried_next_tick() {
        let mut t = terrain(small_config());
        t.session.evaluator.backend_mut().fail_dispatches("device lost");
        assert!(t.tick(0.0, Vec3::ZERO).is_err(), "Tile generation should fail");
        assert_eq!(t.grid().active_count(), 5, "Cells are still spawned");
        assert_eq!(t.tile_count(), 0);

        t.session.evaluator.backend_mut().clear_fault();
        let report = t.tick(0.0, Vec3::ZERO).unwrap();
        assert!(report.spawned.is_empty(), "No new cells on the second tick");
        assert_eq!(t.tile_count(), t.grid().active_count(), "Every active cell gets a tile");
        for (key, _) in t.grid().active_cells() {
            assert!(t.tile(key).is_some(), "Active cell {:?} has no tile", key);
        }
    }

    #[test]
    fn test_failed_reseed_keeps_current_generation() {
        let mut t = terrain(small_config());
        t.tick(0.0, Vec3::ZERO).unwrap();
        let before = t.generate_tile(Vec3::ZERO).unwrap();

        t.session.evaluator.backend_mut().set_allocation_limit(Some(8));
        assert!(t.next_seed().is_err(), "Uploading the new model should overflow");
        assert_eq!(t.seed(), 15);
        assert_eq!(t.model().seed(), 15);
        assert_eq!(t.evaluator().model().map(|m| m.seed()), Some(15), "Old model stays published");
        assert_eq!(t.grid().active_count(), 5, "Cells survive a failed reseed");
        assert_eq!(t.tile_count(), 5, "Tiles survive a failed reseed");

        t.session.evaluator.backend_mut().set_allocation_limit(None);
        let after = t.generate_tile(Vec3::ZERO).unwrap();
        assert_eq!(before.heights, after.heights, "Sampling still uses the old seed");
    }

    #[test]
    fn test_missing_variant_without_default_fails() {
        let config = FlatTerrainConfig {
            variants: vec!["Missing".into()],
            ..small_config()
        };
        let inst = RecordingInstantiator::with_variants(&[]);
        assert!(matches!(
            FlatTerrain::new(config, CpuBackend::new(), inst),
            Err(TerrainError::Streaming(_))
        ));
    }
}
