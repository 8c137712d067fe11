//! Splitting triangle streams into renderer-sized sub-meshes.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::marching::MeshError;
use super::triangle::Triangle;

/// Vertex limit per renderable mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshBudget {
    /// Maximum vertices in one sub-mesh.
    pub vertex_cap: usize,
}

impl Default for MeshBudget {
    fn default() -> Self {
        Self { vertex_cap: 1 << 16 }
    }
}

impl MeshBudget {
    pub fn new(vertex_cap: usize) -> Self {
        Self { vertex_cap }
    }

    /// Triangles that fit in one sub-mesh: `floor(vertex_cap / 3)`.
    pub fn triangles_per_submesh(&self) -> Result<usize, MeshError> {
        match self.vertex_cap / 3 {
            0 => Err(MeshError::VertexCapTooSmall(self.vertex_cap)),
            n => Ok(n),
        }
    }

    /// Number of sub-meshes needed for `triangles` triangles.
    pub fn submesh_count(&self, triangles: usize) -> Result<usize, MeshError> {
        Ok(triangles.div_ceil(self.triangles_per_submesh()?))
    }

    /// Splits a triangle stream into flat sub-meshes.
    ///
    /// Every sub-mesh but the last holds exactly `triangles_per_submesh`
    /// triangles and the last holds the rest, so the total is preserved.
    pub fn split(&self, triangles: &[Triangle]) -> Result<Vec<SubMesh>, MeshError> {
        let per_submesh = self.triangles_per_submesh()?;
        Ok(triangles.chunks(per_submesh).map(SubMesh::from_triangles).collect())
    }
}

/// A non-indexed mesh: every triangle owns its three vertices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubMesh {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Sequential indices, as renderers still expect an index list.
    pub indices: Vec<u32>,
}

impl SubMesh {
    /// Builds a flat-shaded mesh with one face normal per vertex.
    pub fn from_triangles(triangles: &[Triangle]) -> Self {
        let mut vertices = Vec::with_capacity(triangles.len() * 3);
        let mut normals = Vec::with_capacity(triangles.len() * 3);
        for triangle in triangles {
            let normal = triangle.normal();
            for v in triangle.vertices() {
                vertices.push(v);
                normals.push(normal);
            }
        }
        let indices = (0..vertices.len() as u32).collect();
        Self {
            vertices,
            normals,
            indices,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Axis-aligned bounds, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        Some(
            self.vertices
                .iter()
                .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(count: usize) -> Vec<Triangle> {
        (0..count)
            .map(|i| {
                let o = Vec3::new(i as f32, 0.0, 0.0);
                Triangle::new(o, o + Vec3::X, o + Vec3::Y)
            })
            .collect()
    }

    #[test]
    fn test_historical_cap() {
        let budget = MeshBudget::default();
        assert_eq!(budget.triangles_per_submesh().unwrap(), 21845);
    }

    #[test]
    fn test_split_counts() {
        let budget = MeshBudget::new(30);
        for total in [0usize, 1, 9, 10, 11, 20, 25, 31] {
            let meshes = budget.split(&stream(total)).unwrap();
            assert_eq!(meshes.len(), total.div_ceil(10), "Wrong sub-mesh count for {}", total);
            assert_eq!(meshes.len(), budget.submesh_count(total).unwrap());

            let sum: usize = meshes.iter().map(SubMesh::triangle_count).sum();
            assert_eq!(sum, total, "Triangles lost while splitting {}", total);

            if let Some((last, full)) = meshes.split_last() {
                assert!(full.iter().all(|m| m.triangle_count() == 10));
                assert!(last.triangle_count() >= 1 && last.triangle_count() <= 10);
            }
        }
    }

    #[test]
    fn test_exact_multiple_keeps_full_final_submesh() {
        let meshes = MeshBudget::new(9).split(&stream(6)).unwrap();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[1].triangle_count(), 3, "Final sub-mesh must not be empty");
    }

    #[test]
    fn test_flat_vertices_and_normals() {
        let meshes = MeshBudget::new(300).split(&stream(4)).unwrap();
        let mesh = &meshes[0];
        assert_eq!(mesh.vertices.len(), 12);
        assert_eq!(mesh.normals.len(), 12);
        assert_eq!(mesh.indices, (0..12).collect::<Vec<u32>>());
        assert!(mesh.normals.iter().all(|n| *n == Vec3::Z));
    }

    #[test]
    fn test_tiny_cap_rejected() {
        assert_eq!(
            MeshBudget::new(2).split(&stream(1)),
            Err(MeshError::VertexCapTooSmall(2))
        );
    }

    #[test]
    fn test_bounds() {
        let mesh = SubMesh::from_triangles(&stream(3));
        assert_eq!(mesh.bounds(), Some((Vec3::ZERO, Vec3::new(3.0, 1.0, 0.0))));
        assert_eq!(SubMesh::default().bounds(), None);
    }
}
