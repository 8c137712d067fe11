//! Integer cell keys.

use std::cmp::Ordering;
use std::fmt;

use glam::{IVec3, Vec3};
use serde::{Deserialize, Serialize};

/// Grid coordinate of one streamed cell.
///
/// Keys are integer lattice indices; the world position of a cell is
/// `key * offset`, so equal cells always compare equal regardless of
/// how the tracked point moved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey(pub IVec3);

impl CellKey {
    pub const ORIGIN: Self = Self(IVec3::ZERO);

    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self(IVec3::new(x, y, z))
    }

    /// Nearest lattice key to `position` for a grid spaced by `offset`.
    ///
    /// When `lock_y` is set the vertical index is always zero.
    pub fn snap(position: Vec3, offset: f32, lock_y: bool) -> Self {
        let scaled = (position / offset).round();
        let y = if lock_y { 0 } else { scaled.y as i32 };
        Self::new(scaled.x as i32, y, scaled.z as i32)
    }

    /// World position of this cell; `pinned_y` replaces the vertical axis.
    pub fn world_position(self, offset: f32, pinned_y: Option<f32>) -> Vec3 {
        let p = self.0.as_vec3() * offset;
        match pinned_y {
            Some(y) => Vec3::new(p.x, y, p.z),
            None => p,
        }
    }

    pub fn offset_by(self, delta: IVec3) -> Self {
        Self(self.0 + delta)
    }
}

impl Ord for CellKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.to_array().cmp(&other.0.to_array())
    }
}

impl PartialOrd for CellKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.0.x, self.0.y, self.0.z)
    }
}
