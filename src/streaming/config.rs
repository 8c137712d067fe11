//! Streaming grid configuration.

use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Shape of the region cells must stay inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullMode {
    /// Sphere whose radius is the largest axis extent.
    #[default]
    Radial,
    /// Sphere through the corners of the candidate box.
    Box,
}

/// What happens to a cell that leaves the region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CullPolicy {
    /// Disable the handle and keep it for reuse.
    #[default]
    Hide,
    /// Destroy the handle and forget the cell.
    Destroy,
}

/// How many new cells may be instantiated per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillMode {
    /// Instantiate every missing cell at once.
    All,
    /// Instantiate at most `max_per_tick` new cells, nearest first.
    Incremental { max_per_tick: usize },
}

impl Default for FillMode {
    fn default() -> Self {
        Self::Incremental { max_per_tick: 1 }
    }
}

impl FillMode {
    pub fn creation_cap(&self) -> usize {
        match *self {
            Self::All => usize::MAX,
            Self::Incremental { max_per_tick } => max_per_tick,
        }
    }
}

/// Parameters of a [`StreamingGrid`](super::StreamingGrid).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Distance between neighbouring cell centers.
    pub offset: f32,
    /// Cells per axis in the candidate box.
    pub repeat: UVec3,
    /// Pins the vertical axis to this height; the box is then one cell tall.
    pub lock_y: Option<f32>,
    pub cull_mode: CullMode,
    pub cull_policy: CullPolicy,
    pub fill_mode: FillMode,
    /// Overrides the radius derived from `repeat` and `cull_mode`.
    /// A radius of zero or less streams nothing.
    pub cull_radius: Option<f32>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            offset: 40.0,
            repeat: UVec3::new(3, 1, 3),
            lock_y: None,
            cull_mode: CullMode::default(),
            cull_policy: CullPolicy::default(),
            fill_mode: FillMode::default(),
            cull_radius: None,
        }
    }
}

impl GridConfig {
    /// Candidate box dimensions after applying the vertical lock.
    pub fn effective_repeat(&self) -> UVec3 {
        if self.lock_y.is_some() {
            UVec3::new(self.repeat.x, 1, self.repeat.z)
        } else {
            self.repeat
        }
    }

    /// Half size of the candidate box in world units.
    pub fn extents(&self) -> Vec3 {
        (self.effective_repeat().as_vec3() - Vec3::ONE) * self.offset * 0.5
    }

    /// Squared cull radius, or `None` when nothing may stream.
    pub fn cull_radius_sq(&self) -> Option<f32> {
        match self.cull_radius {
            Some(r) if r <= 0.0 => None,
            Some(r) => Some(r * r),
            None => {
                let extents = self.extents();
                Some(match self.cull_mode {
                    CullMode::Radial => {
                        let r = extents.max_element();
                        r * r
                    }
                    CullMode::Box => extents.length_squared(),
                })
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.offset > 0.0) {
            return Err(ConfigError::invalid("offset", "must be positive"));
        }
        if self.repeat.min_element() == 0 {
            return Err(ConfigError::invalid("repeat", "every axis needs at least one cell"));
        }
        if let Some(r) = self.cull_radius {
            if r.is_nan() {
                return Err(ConfigError::invalid("cull_radius", "must be a number"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(GridConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = GridConfig::default();
        config.offset = 0.0;
        assert!(config.validate().is_err());

        let mut config = GridConfig::default();
        config.repeat = UVec3::new(3, 0, 3);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_radius() {
        let config = GridConfig {
            offset: 20.0,
            repeat: UVec3::new(3, 1, 3),
            ..Default::default()
        };
        assert_eq!(config.extents(), Vec3::new(20.0, 0.0, 20.0));
        assert_eq!(config.cull_radius_sq(), Some(400.0));

        let boxed = GridConfig {
            cull_mode: CullMode::Box,
            ..config
        };
        assert_eq!(boxed.cull_radius_sq(), Some(800.0));
    }

    #[test]
    fn test_lock_y_flattens_box() {
        let config = GridConfig {
            repeat: UVec3::new(5, 5, 5),
            lock_y: Some(0.0),
            ..Default::default()
        };
        assert_eq!(config.effective_repeat(), UVec3::new(5, 1, 5));
        assert_eq!(config.extents().y, 0.0);
    }

    #[test]
    fn test_zero_radius_streams_nothing() {
        let config = GridConfig {
            cull_radius: Some(0.0),
            ..Default::default()
        };
        assert_eq!(config.cull_radius_sq(), None);
    }

    #[test]
    fn test_fill_mode_round_trips_through_json() {
        let config = GridConfig {
            fill_mode: FillMode::Incremental { max_per_tick: 4 },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: GridConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
