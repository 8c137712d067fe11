//! Voxel planet terrain.

use std::collections::HashMap;
use std::sync::Arc;

use glam::Vec3;
use log::debug;

use super::config::PlanetConfig;
use super::diagnostics::ConfigDump;
use super::error::TerrainError;
use super::session::{Session, SessionParts};
use crate::field::{ComputeBackend, FieldEvaluator};
use crate::mesh::SubMesh;
use crate::noise::NoiseModel;
use crate::streaming::{CellKey, Instantiator, LodTracker, StreamingGrid, TickReport};

/// Meshed surface of one voxel cell.
#[derive(Debug, Clone)]
pub struct CellMesh {
    pub key: CellKey,
    /// Samples per axis the cell was meshed at.
    pub lod: u32,
    pub submeshes: Vec<SubMesh>,
    pub triangle_count: usize,
    /// Set when sampling or extraction reported a configuration mismatch.
    pub dirty: bool,
}

/// Outcome of one [`PlanetTerrain::tick`].
#[derive(Debug, Clone, Default)]
pub struct PlanetTick {
    pub grid: TickReport,
    /// Cells meshed this tick, nearest first.
    pub remeshed: Vec<CellKey>,
    /// Cells whose level changed but were left for a later tick.
    pub pending: Vec<CellKey>,
}

/// Streams marching-cubes cells around a tracked point.
///
/// A cell is remeshed only when its resolved level of detail differs from
/// the level it was last meshed at.
pub struct PlanetTerrain<B: ComputeBackend, I: Instantiator> {
    config: PlanetConfig,
    session: Session<B, I>,
    levels: LodTracker,
    meshes: HashMap<CellKey, CellMesh>,
}

impl<B: ComputeBackend, I: Instantiator> PlanetTerrain<B, I> {
    /// Validates the config, resolves variants and publishes the first model.
    pub fn new(config: PlanetConfig, backend: B, instantiator: I) -> Result<Self, TerrainError> {
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
            levels: LodTracker::new(),
            meshes: HashMap::new(),
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &PlanetConfig {
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

    /// The streaming grid that decides which cells exist.
    pub fn grid(&self) -> &StreamingGrid<I> {
        &self.session.grid
    }

    /// The field evaluator cells are sampled through.
    pub fn evaluator(&self) -> &FieldEvaluator<B> {
        &self.session.evaluator
    }

    /// Mesh of a streamed cell.
    pub fn mesh(&self, key: CellKey) -> Option<&CellMesh> {
        self.meshes.get(&key)
    }

    /// Number of cells holding a mesh.
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Level of detail a cell at `position` gets when tracking `tracked`.
    pub fn lod_for(&self, position: Vec3, tracked: Vec3) -> u32 {
        let cells = position.distance(tracked) / self.config.cell_offset();
        self.config.lod.resolve(cells)
    }

    /// Advances streaming and remeshes cells whose level changed.
    pub fn tick(&mut self, dt: f32, tracked: Vec3) -> Result<PlanetTick, TerrainError> {
        if self.session.timer.advance(dt) {
            self.regenerate()?;
        }
        let grid = self.session.grid.tick(tracked, &self.session.model);
        for key in &grid.destroyed {
            self.meshes.remove(key);
            self.levels.forget(*key);
        }

        let mut stale: Vec<(f32, CellKey, u32)> = self
            .session
            .grid
            .active_cells()
            .into_iter()
            .filter_map(|(key, _)| {
                let position = self.session.grid.position_of(key);
                let lod = self.lod_for(position, tracked);
                (self.levels.get(key) != Some(lod))
                    .then(|| (position.distance_squared(tracked), key, lod))
            })
            .collect();
        stale.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let cap = self.config.remesh_cap.unwrap_or(usize::MAX);
        let mut tick = PlanetTick {
            grid,
            ..Default::default()
        };
        for (_, key, lod) in stale {
            if tick.remeshed.len() >= cap {
                tick.pending.push(key);
                continue;
            }
            let mesh = self.build_cell_mesh(key, lod)?;
            self.levels.update(key, lod);
            self.meshes.insert(key, mesh);
            tick.remeshed.push(key);
        }
        Ok(tick)
    }

    /// Samples and meshes the cell `key` at `lod` samples per axis.
    pub fn build_cell_mesh(&mut self, key: CellKey, lod: u32) -> Result<CellMesh, TerrainError> {
        let center = self.session.grid.position_of(key);
        let half = Vec3::splat(self.config.cube_size);
        let evaluator = &mut self.session.evaluator;

        let field = evaluator.densities(center - half, center + half, lod as usize, &self.config.shell)?;
        let stream = evaluator.extract_triangles(&field, self.config.surface)?;
        let submeshes = self.config.budget.split(&stream.triangles)?;
        debug!(
            "Meshed cell {} at LOD {}: {} triangles in {} sub-meshes",
            key,
            lod,
            stream.triangles.len(),
            submeshes.len()
        );
        Ok(CellMesh {
            key,
            lod,
            triangle_count: stream.triangles.len(),
            submeshes,
            dirty: field.is_dirty() || stream.status.is_dirty(),
        })
    }

    /// Switches to `seed`, clearing every mesh.
    pub fn set_seed(&mut self, seed: u64) -> Result<(), TerrainError> {
        self.session.reseed(seed)?;
        self.config.seed = seed;
        self.meshes.clear();
        self.levels.clear();
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
        ConfigDump::planet(&self.config, &self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::cpu::CpuBackend;
    use crate::noise::{ErosionBounds, NoiseConfig, PlanetShell};
    use crate::streaming::testing::RecordingInstantiator;
    use crate::streaming::{FillMode, LodConfig};

    fn small_config() -> PlanetConfig {
        PlanetConfig {
            cube_size: 10.0,
            render_distance: 3,
            shell: PlanetShell {
                radius: 25.0,
                ..Default::default()
            },
            lod: LodConfig {
                max_lod: 8,
                min_lod: 4,
                lod_distance: 2.0,
                falloff: 1.0,
            },
            fill_mode: FillMode::All,
            noise: NoiseConfig {
                variant_bounds: ErosionBounds {
                    variants: 2,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn terrain(config: PlanetConfig) -> PlanetTerrain<CpuBackend, RecordingInstantiator> {
        let inst = RecordingInstantiator::with_variants(&["Chunk3D"]);
        PlanetTerrain::new(config, CpuBackend::new(), inst).unwrap()
    }

    #[test]
    fn test_surface_cell_produces_mesh() {
        let mut t = terrain(small_config());
        // The cell centered at (20, 0, 0) straddles the shell between 17.5 and 23.75.
        let mesh = t.build_cell_mesh(CellKey::new(1, 0, 0), 8).unwrap();
        assert!(mesh.triangle_count > 0, "Surface cell must produce triangles");
        assert!(!mesh.dirty);
        let total: usize = mesh.submeshes.iter().map(|m| m.triangle_count()).sum();
        assert_eq!(total, mesh.triangle_count);
        for sub in &mesh.submeshes {
            let (lo, hi) = sub.bounds().unwrap();
            assert!(lo.cmpge(Vec3::new(10.0, -10.0, -10.0) - 1e-3).all());
            assert!(hi.cmple(Vec3::new(30.0, 10.0, 10.0) + 1e-3).all());
        }
    }

    #[test]
    fn test_empty_space_produces_no_triangles() {
        let mut t = terrain(small_config());
        let mesh = t.build_cell_mesh(CellKey::new(5, 5, 5), 4).unwrap();
        assert_eq!(mesh.triangle_count, 0);
        assert!(mesh.submeshes.is_empty());
    }

    #[test]
    fn test_tick_meshes_only_changed_levels() {
        let mut t = terrain(small_config());
        let first = t.tick(0.0, Vec3::ZERO).unwrap();
        assert_eq!(first.remeshed.len(), t.grid().active_count());
        assert_eq!(first.remeshed[0], CellKey::ORIGIN, "Nearest cell meshes first");

        let second = t.tick(0.0, Vec3::ZERO).unwrap();
        assert!(second.remeshed.is_empty(), "Unchanged levels must not remesh");

        // Stays on the same cell but moves closer to (1, 0, 0).
        let third = t.tick(0.0, Vec3::new(9.0, 0.0, 0.0)).unwrap();
        assert!(third.grid.is_quiet());
        for key in &third.remeshed {
            let lod = t.mesh(*key).unwrap().lod;
            assert_eq!(lod, t.lod_for(t.grid().position_of(*key), Vec3::new(9.0, 0.0, 0.0)));
        }
    }

    #[test]
    fn test_remesh_cap_defers_work() {
        let mut config = small_config();
        config.remesh_cap = Some(2);
        let mut t = terrain(config);
        let first = t.tick(0.0, Vec3::ZERO).unwrap();
        assert_eq!(first.remeshed.len(), 2);
        assert_eq!(first.pending.len(), t.grid().active_count() - 2);

        let mut ticks = 1;
        let mut pending = first.pending.len();
        while pending > 0 {
            let next = t.tick(0.0, Vec3::ZERO).unwrap();
            assert!(next.remeshed.len() <= 2);
            pending = next.pending.len();
            ticks += 1;
        }
        assert_eq!(t.mesh_count(), t.grid().active_count());
        assert!(ticks > 1);
    }

    #[test]
    fn test_regenerate_drops_meshes() {
        let mut t = terrain(small_config());
        t.tick(0.0, Vec3::ZERO).unwrap();
        assert!(t.mesh_count() > 0);
        t.regenerate().unwrap();
        assert_eq!(t.mesh_count(), 0);
        assert!(t.grid().is_empty());
        let again = t.tick(0.0, Vec3::ZERO).unwrap();
        assert_eq!(again.remeshed.len(), t.grid().active_count(), "Everything remeshes after regeneration");
    }

    #[test]
    fn test_lod_decreases_with_distance() {
        let t = terrain(small_config());
        let near = t.lod_for(Vec3::ZERO, Vec3::ZERO);
        let mid = t.lod_for(Vec3::new(20.0, 0.0, 0.0), Vec3::ZERO);
        let far = t.lod_for(Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO);
        assert_eq!((near, mid, far), (8, 4, 4));
    }
}
