//! Index layout contract between backends and host-side fields.
//!
//! Backends write heightmaps x-major (`x * size + z`), splat weights
//! layer-major (`layer * size^2 + y * size + x`) and volumes x-fastest
//! (`x + y * size + z * size^2`). Host fields store heights row-major by
//! `z` and splat weights interleaved per texel. Getting any of these wrong
//! transposes the terrain without failing, so every mapping is tested here.

use glam::Vec3;

pub use crate::mesh::volume_index;

/// Distance between adjacent samples; samples include both endpoints.
pub fn sample_spacing(start: Vec3, end: Vec3, size: usize) -> Vec3 {
    if size < 2 {
        return Vec3::ZERO;
    }
    (end - start) / (size - 1) as f32
}

/// Backend index of heightmap sample `(x, z)`.
#[inline]
pub fn heightmap_backend_index(x: usize, z: usize, size: usize) -> usize {
    x * size + z
}

/// Splits a backend heightmap index into `(x, z)`.
#[inline]
pub fn unpack_heightmap_index(i: usize, size: usize) -> (usize, usize) {
    (i / size, i % size)
}

/// Host index of heightmap sample `(x, z)`, row `z` major.
#[inline]
pub fn heightmap_host_index(x: usize, z: usize, size: usize) -> usize {
    z * size + x
}

/// Backend index of splat weight `(x, y, layer)`.
#[inline]
pub fn splat_backend_index(x: usize, y: usize, layer: usize, size: usize) -> usize {
    layer * size * size + y * size + x
}

/// Splits a backend splat index into `(x, y, layer)`.
#[inline]
pub fn unpack_splat_index(i: usize, size: usize) -> (usize, usize, usize) {
    (i % size, (i / size) % size, i / (size * size))
}

/// Host index of splat weight `(x, y, layer)`, interleaved per texel.
#[inline]
pub fn splat_host_index(x: usize, y: usize, layer: usize, size: usize, layers: usize) -> usize {
    (y * size + x) * layers + layer
}

/// Splits a volume index into `(x, y, z)`.
#[inline]
pub fn unpack_volume_index(i: usize, size: usize) -> (usize, usize, usize) {
    (i % size, (i / size) % size, i / (size * size))
}

/// Work groups needed to cover `extent` threads with groups of `group`.
#[inline]
pub fn group_count(extent: usize, group: u32) -> u32 {
    let group = group.max(1) as usize;
    extent.div_ceil(group) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heightmap_unpack_is_inverse() {
        let size = 5;
        for x in 0..size {
            for z in 0..size {
                let i = heightmap_backend_index(x, z, size);
                assert_eq!(unpack_heightmap_index(i, size), (x, z));
            }
        }
    }

    #[test]
    fn test_heightmap_contract_fixed() {
        // row = i % size, column = i / size
        let size = 65;
        assert_eq!(unpack_heightmap_index(1, size), (0, 1), "Consecutive entries walk along z");
        assert_eq!(unpack_heightmap_index(65, size), (1, 0));
        assert_eq!(heightmap_host_index(1, 0, size), 1, "Host rows walk along x");
    }

    #[test]
    fn test_splat_unpack_is_inverse() {
        let size = 4;
        for layer in 0..3 {
            for y in 0..size {
                for x in 0..size {
                    let i = splat_backend_index(x, y, layer, size);
                    assert_eq!(unpack_splat_index(i, size), (x, y, layer));
                }
            }
        }
        assert_eq!(unpack_splat_index(16, 4), (0, 0, 1), "Layers are the slowest axis");
    }

    #[test]
    fn test_volume_unpack_is_inverse() {
        let size = 3;
        for i in 0..size * size * size {
            let (x, y, z) = unpack_volume_index(i, size);
            assert_eq!(volume_index(x, y, z, size), i);
        }
        assert_eq!(unpack_volume_index(1, 3), (1, 0, 0), "x varies fastest");
    }

    #[test]
    fn test_spacing_includes_endpoints() {
        let spacing = sample_spacing(Vec3::splat(-10.0), Vec3::splat(10.0), 5);
        assert_eq!(spacing, Vec3::splat(5.0));
        assert_eq!(sample_spacing(Vec3::ZERO, Vec3::ONE, 1), Vec3::ZERO);
    }

    #[test]
    fn test_group_count_rounds_up() {
        assert_eq!(group_count(64, 8), 8);
        assert_eq!(group_count(65, 8), 9);
        assert_eq!(group_count(5, 0), 5);
    }
}
