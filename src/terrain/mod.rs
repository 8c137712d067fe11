//! Terrain generators built on the noise, field, mesh and streaming layers.
//!
//! [`FlatTerrain`] streams heightmapped tiles with alphamaps over a plane;
//! [`PlanetTerrain`] streams marching-cubes cells of a voxel planet with
//! distance-based level of detail. Both regenerate atomically on a seed
//! change.

mod config;
mod diagnostics;
mod error;
mod flat;
mod planet;
mod session;
mod splat;

pub use config::{FlatTerrainConfig, PlanetConfig, RegenSchedule};
pub use diagnostics::ConfigDump;
pub use error::TerrainError;
pub use flat::{FlatTerrain, HeightTile};
pub use planet::{CellMesh, PlanetTerrain, PlanetTick};
pub use session::RegenTimer;
pub use splat::{blend_alphamaps, steepness};
