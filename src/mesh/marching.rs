//! Marching-cubes triangulation of sampled density volumes.

use glam::Vec3;
use thiserror::Error;

use super::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRI_TABLE};
use super::triangle::Triangle;

/// Errors from mesh extraction and budgeting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    #[error("volume holds {actual} samples, expected {expected} for size {size}")]
    VolumeSize {
        size: usize,
        expected: usize,
        actual: usize,
    },
    #[error("vertex cap {0} cannot hold a single triangle")]
    VertexCapTooSmall(usize),
}

/// Linear index of a volume sample; `x` varies fastest.
#[inline]
pub fn volume_index(x: usize, y: usize, z: usize, size: usize) -> usize {
    x + y * size + z * size * size
}

/// Triangulates every cell of a cubic sample volume.
///
/// Each sample holds a world position in `xyz` and a density in `w`.
/// Cells are visited with `x` fastest, so the output order is fixed for
/// a given volume and threshold.
///
/// # Arguments
/// * `samples` - `size^3` samples
/// * `size` - Samples per axis
/// * `surface` - Isosurface threshold; denser samples are solid
///
/// # Returns
/// The triangle stream, or an error if the volume is malformed
pub fn march_volume(
    samples: &[[f32; 4]],
    size: usize,
    surface: f32,
) -> Result<Vec<Triangle>, MeshError> {
    check_volume(samples, size)?;
    let mut triangles = Vec::new();
    if size < 2 {
        return Ok(triangles);
    }
    let cells = size - 1;
    for z in 0..cells {
        for y in 0..cells {
            for x in 0..cells {
                march_cell(samples, size, [x, y, z], surface, &mut triangles);
            }
        }
    }
    Ok(triangles)
}

/// Checks that a volume holds exactly `size^3` samples.
pub fn check_volume(samples: &[[f32; 4]], size: usize) -> Result<(), MeshError> {
    let expected = size * size * size;
    if samples.len() != expected {
        return Err(MeshError::VolumeSize {
            size,
            expected,
            actual: samples.len(),
        });
    }
    Ok(())
}

/// Triangulates one cell whose lowest corner is sample `cell`.
///
/// The caller guarantees `cell + 1` is inside the volume on every axis.
pub fn march_cell(
    samples: &[[f32; 4]],
    size: usize,
    cell: [usize; 3],
    surface: f32,
    out: &mut Vec<Triangle>,
) {
    let mut corner_index = [0usize; 8];
    let mut case = 0usize;
    for (corner, offset) in CORNER_OFFSETS.iter().enumerate() {
        let index = volume_index(cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2], size);
        corner_index[corner] = index;
        if samples[index][3] > surface {
            case |= 1 << corner;
        }
    }

    let edges = EDGE_TABLE[case];
    if edges == 0 {
        return;
    }

    let mut crossings = [Vec3::ZERO; 12];
    for (edge, corners) in EDGE_CORNERS.iter().enumerate() {
        if edges & (1 << edge) == 0 {
            continue;
        }
        // Shared edges interpolate in sample order so neighbours agree bit for bit.
        let (mut ia, mut ib) = (corner_index[corners[0]], corner_index[corners[1]]);
        if ia > ib {
            std::mem::swap(&mut ia, &mut ib);
        }
        crossings[edge] = interpolate(samples[ia], samples[ib], surface);
    }

    for tri in TRI_TABLE[case].chunks_exact(3) {
        if tri[0] < 0 {
            break;
        }
        out.push(Triangle::new(
            crossings[tri[0] as usize],
            crossings[tri[1] as usize],
            crossings[tri[2] as usize],
        ));
    }
}

fn interpolate(a: [f32; 4], b: [f32; 4], surface: f32) -> Vec3 {
    let pa = Vec3::new(a[0], a[1], a[2]);
    let pb = Vec3::new(b[0], b[1], b[2]);
    let span = b[3] - a[3];
    if span.abs() < 1e-6 {
        return (pa + pb) * 0.5;
    }
    let t = ((surface - a[3]) / span).clamp(0.0, 1.0);
    pa + (pb - pa) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn grid_volume(size: usize, start: Vec3, end: Vec3, density: impl Fn(usize, usize, usize) -> f32) -> Vec<[f32; 4]> {
        let step = (end - start) / (size - 1) as f32;
        let mut samples = vec![[0.0; 4]; size * size * size];
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let p = start + step * Vec3::new(x as f32, y as f32, z as f32);
                    samples[volume_index(x, y, z, size)] = [p.x, p.y, p.z, density(x, y, z)];
                }
            }
        }
        samples
    }

    fn key(v: Vec3) -> [u32; 3] {
        [v.x.to_bits(), v.y.to_bits(), v.z.to_bits()]
    }

    fn directed_edges(triangles: &[Triangle]) -> HashMap<([u32; 3], [u32; 3]), usize> {
        let mut edges = HashMap::new();
        for t in triangles {
            let v = t.vertices();
            for i in 0..3 {
                *edges.entry((key(v[i]), key(v[(i + 1) % 3]))).or_insert(0) += 1;
            }
        }
        edges
    }

    #[test]
    fn test_single_solid_sample_closed_surface() {
        let size = 8;
        let start = Vec3::splat(-10.0);
        let end = Vec3::splat(10.0);
        let samples = grid_volume(size, start, end, |x, y, z| {
            if (x, y, z) == (4, 4, 4) {
                1.0
            } else {
                0.0
            }
        });

        let triangles = march_volume(&samples, size, 0.5).unwrap();
        assert_eq!(triangles.len(), 8, "A lone solid sample is wrapped by an octahedron");

        for t in &triangles {
            for v in t.vertices() {
                assert!(v.cmpge(start).all() && v.cmple(end).all(), "Vertex {:?} escaped region", v);
            }
        }

        let edges = directed_edges(&triangles);
        for ((a, b), count) in &edges {
            assert_eq!(*count, 1, "Directed edge repeated");
            assert!(edges.contains_key(&(*b, *a)), "Surface has an open edge");
        }
    }

    #[test]
    fn test_normals_face_empty_side() {
        let size = 8;
        let samples = grid_volume(size, Vec3::splat(-10.0), Vec3::splat(10.0), |x, y, z| {
            if (x, y, z) == (4, 4, 4) {
                1.0
            } else {
                0.0
            }
        });
        let step = 20.0 / 7.0;
        let center = Vec3::splat(-10.0 + 4.0 * step);
        for t in march_volume(&samples, size, 0.5).unwrap() {
            let [a, b, c] = t.vertices();
            let centroid = (a + b + c) / 3.0;
            assert!(
                t.normal().dot(centroid - center) > 0.0,
                "Normals should point away from solid matter"
            );
        }
    }

    #[test]
    fn test_sphere_is_watertight() {
        let size = 12;
        let samples = grid_volume(size, Vec3::splat(-1.0), Vec3::splat(1.0), |x, y, z| {
            let c = (size - 1) as f32 / 2.0;
            let d = Vec3::new(x as f32 - c, y as f32 - c, z as f32 - c).length();
            1.0 - d / 4.0
        });
        let triangles = march_volume(&samples, size, 0.5).unwrap();
        assert!(!triangles.is_empty());
        let edges = directed_edges(&triangles);
        for (a, b) in edges.keys() {
            assert!(edges.contains_key(&(*b, *a)), "Sphere surface has a crack");
        }
    }

    #[test]
    fn test_uniform_volume_is_empty() {
        let samples = grid_volume(4, Vec3::ZERO, Vec3::ONE, |_, _, _| 1.0);
        assert!(march_volume(&samples, 4, 0.5).unwrap().is_empty());
    }

    #[test]
    fn test_deterministic_ordering() {
        let samples = grid_volume(6, Vec3::ZERO, Vec3::splat(5.0), |x, y, z| {
            ((x * 7 + y * 13 + z * 3) % 5) as f32 / 4.0
        });
        let a = march_volume(&samples, 6, 0.5).unwrap();
        let b = march_volume(&samples, 6, 0.5).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_sample_count_rejected() {
        let samples = vec![[0.0; 4]; 10];
        assert_eq!(
            march_volume(&samples, 3, 0.5),
            Err(MeshError::VolumeSize { size: 3, expected: 27, actual: 10 })
        );
    }
}
