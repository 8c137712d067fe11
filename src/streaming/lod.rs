//! Distance-based level of detail.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::key::CellKey;
use crate::error::ConfigError;

/// Level-of-detail rule for voxel cells.
///
/// The level is the cell resolution (samples per axis). It starts at
/// `max_lod`, halves once per `1 / falloff` cells of distance, drops to
/// zero past `lod_distance` cells, and is finally clamped to `min_lod`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    pub max_lod: u32,
    pub min_lod: u32,
    /// Distance in cells past which the lowest level is used.
    pub lod_distance: f32,
    /// Halvings per cell of distance.
    pub falloff: f32,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_lod: 64,
            min_lod: 4,
            lod_distance: 6.0,
            falloff: 0.5,
        }
    }
}

impl LodConfig {
    /// Resolved level for a cell `distance` cells away from the tracked point.
    pub fn resolve(&self, distance: f32) -> u32 {
        let lod = if distance > self.lod_distance {
            0
        } else {
            let shifts = (distance.max(0.0) * self.falloff).floor() as u32;
            self.max_lod.checked_shr(shifts).unwrap_or(0)
        };
        lod.max(self.min_lod)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_lod < 2 {
            return Err(ConfigError::invalid("min_lod", "a cell needs at least two samples per axis"));
        }
        if self.max_lod < self.min_lod {
            return Err(ConfigError::invalid("max_lod", "must not be below min_lod"));
        }
        if !(self.falloff >= 0.0) {
            return Err(ConfigError::invalid("falloff", "must be non-negative"));
        }
        if !(self.lod_distance >= 0.0) {
            return Err(ConfigError::invalid("lod_distance", "must be non-negative"));
        }
        Ok(())
    }
}

/// Remembers the last resolved level per cell.
#[derive(Debug, Clone, Default)]
pub struct LodTracker {
    levels: HashMap<CellKey, u32>,
}

impl LodTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `lod` for `key`.
    ///
    /// # Returns
    /// `true` when the level differs from the stored one, meaning the
    /// cell must be remeshed.
    pub fn update(&mut self, key: CellKey, lod: u32) -> bool {
        self.levels.insert(key, lod) != Some(lod)
    }

    pub fn get(&self, key: CellKey) -> Option<u32> {
        self.levels.get(&key).copied()
    }

    pub fn forget(&mut self, key: CellKey) {
        self.levels.remove(&key);
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
