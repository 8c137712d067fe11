//! Procedural terrain streaming engine.
//!
//! This crate generates flat heightmapped terrain tiles and voxel planet
//! terrain from layered noise, streams them around a moving viewpoint and
//! turns sampled density fields into renderer-sized triangle meshes.
//! Field evaluation goes through an injected compute backend; the CPU
//! reference backend in [`field::cpu`] runs every kernel on the host.

pub mod error;
pub mod export;
pub mod field;
pub mod mesh;
pub mod noise;
pub mod streaming;
pub mod terrain;

pub use error::ConfigError;
pub use field::{ComputeBackend, CpuBackend, FieldEvaluator};
pub use mesh::{extract_surface, MeshBudget, SubMesh, Triangle};
pub use noise::{NoiseConfig, NoiseModel};
pub use streaming::{CellKey, GridConfig, Instantiator, StreamingGrid};
pub use terrain::{FlatTerrain, FlatTerrainConfig, PlanetConfig, PlanetTerrain, TerrainError};
