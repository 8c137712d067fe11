//! Density-field to triangle-mesh extraction.
//!
//! Marching cubes turns a sampled volume into an unbounded triangle stream;
//! [`MeshBudget`] then splits that stream into sub-meshes that respect a
//! renderer's vertex cap.

mod budget;
mod marching;
mod tables;
mod triangle;

pub use budget::{MeshBudget, SubMesh};
pub use marching::{check_volume, march_cell, march_volume, volume_index, MeshError};
pub use tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, MAX_TRIANGLES_PER_CELL, TRI_TABLE};
pub use triangle::Triangle;

use crate::field::DensityField;

/// Triangulates a density field on the host.
///
/// # Arguments
/// * `field` - Sampled volume
/// * `surface` - Isosurface threshold
pub fn extract_surface(field: &DensityField, surface: f32) -> Result<Vec<Triangle>, MeshError> {
    march_volume(field.samples(), field.size(), surface)
}
