//! Dense sample fields produced by the evaluator.

use std::fmt;

use glam::Vec3;

use super::layout::{heightmap_host_index, sample_spacing, splat_host_index, volume_index};
use crate::mesh::{check_volume, MeshError};

/// A disagreement between what was requested and what the backend did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMismatch {
    pub subject: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ConfigMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, got {}", self.subject, self.expected, self.actual)
    }
}

/// Health of a produced field.
///
/// A field with recorded mismatches is dirty: its data is a best effort
/// and may be partly stale or misplaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldStatus {
    issues: Vec<ConfigMismatch>,
}

impl FieldStatus {
    pub fn is_dirty(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues(&self) -> &[ConfigMismatch] {
        &self.issues
    }

    pub(crate) fn record(&mut self, issue: ConfigMismatch) {
        log::warn!("Configuration mismatch: {}", issue);
        self.issues.push(issue);
    }
}

/// Terrain heights in [0, 1] over a square grid.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightField {
    size: usize,
    start: Vec3,
    end: Vec3,
    heights: Vec<f32>,
    status: FieldStatus,
}

impl HeightField {
    pub(crate) fn new(size: usize, start: Vec3, end: Vec3, heights: Vec<f32>, status: FieldStatus) -> Self {
        Self {
            size,
            start,
            end,
            heights,
            status,
        }
    }

    /// Samples per axis.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.start, self.end)
    }

    /// Height at column `x`, row `z`.
    pub fn get(&self, x: usize, z: usize) -> f32 {
        self.heights[heightmap_host_index(x, z, self.size)]
    }

    /// Row-major heights, row `z` first.
    pub fn as_slice(&self) -> &[f32] {
        &self.heights
    }

    pub fn status(&self) -> &FieldStatus {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.status.is_dirty()
    }

    /// Minimum and maximum height.
    pub fn height_range(&self) -> (f32, f32) {
        self.heights
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }
}

/// Terrain-layer weights over a square grid, interleaved per texel.
#[derive(Debug, Clone, PartialEq)]
pub struct SplatField {
    size: usize,
    layers: usize,
    weights: Vec<f32>,
    status: FieldStatus,
}

impl SplatField {
    pub(crate) fn new(size: usize, layers: usize, weights: Vec<f32>, status: FieldStatus) -> Self {
        Self {
            size,
            layers,
            weights,
            status,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn layers(&self) -> usize {
        self.layers
    }

    /// Weight of `layer` at texel `(x, y)`.
    pub fn get(&self, x: usize, y: usize, layer: usize) -> f32 {
        self.weights[splat_host_index(x, y, layer, self.size, self.layers)]
    }

    /// All layer weights of texel `(x, y)`.
    pub fn texel(&self, x: usize, y: usize) -> &[f32] {
        let first = splat_host_index(x, y, 0, self.size, self.layers);
        &self.weights[first..first + self.layers]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn status(&self) -> &FieldStatus {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.status.is_dirty()
    }

    /// Returns a field with the same layout and status but new weights.
    pub(crate) fn with_weights(&self, weights: Vec<f32>) -> Self {
        Self {
            weights,
            ..self.clone()
        }
    }
}

/// Position and density samples over a cubic grid.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    size: usize,
    samples: Vec<[f32; 4]>,
    status: FieldStatus,
}

impl DensityField {
    pub(crate) fn new(size: usize, samples: Vec<[f32; 4]>, status: FieldStatus) -> Self {
        Self {
            size,
            samples,
            status,
        }
    }

    /// Builds a field from packed `xyz` + density samples.
    pub fn from_samples(size: usize, samples: Vec<[f32; 4]>) -> Result<Self, MeshError> {
        check_volume(&samples, size)?;
        Ok(Self::new(size, samples, FieldStatus::default()))
    }

    /// Samples `density` at every grid point spanning `[start, end]`.
    pub fn from_fn(
        start: Vec3,
        end: Vec3,
        size: usize,
        density: impl Fn(Vec3, [usize; 3]) -> f32,
    ) -> Self {
        let spacing = sample_spacing(start, end, size);
        let mut samples = vec![[0.0; 4]; size * size * size];
        for z in 0..size {
            for y in 0..size {
                for x in 0..size {
                    let p = start + spacing * Vec3::new(x as f32, y as f32, z as f32);
                    samples[volume_index(x, y, z, size)] = [p.x, p.y, p.z, density(p, [x, y, z])];
                }
            }
        }
        Self::new(size, samples, FieldStatus::default())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn density(&self, x: usize, y: usize, z: usize) -> f32 {
        self.samples[volume_index(x, y, z, self.size)][3]
    }

    pub fn position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        let s = self.samples[volume_index(x, y, z, self.size)];
        Vec3::new(s[0], s[1], s[2])
    }

    pub fn samples(&self) -> &[[f32; 4]] {
        &self.samples
    }

    pub fn status(&self) -> &FieldStatus {
        &self.status
    }

    pub fn is_dirty(&self) -> bool {
        self.status.is_dirty()
    }
}
