use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One extracted triangle, laid out for backend append buffers.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Triangle {
    pub a: [f32; 3],
    pub b: [f32; 3],
    pub c: [f32; 3],
}

impl Triangle {
    /// Byte stride of one triangle record.
    pub const STRIDE: usize = std::mem::size_of::<Triangle>();

    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self {
            a: a.to_array(),
            b: b.to_array(),
            c: c.to_array(),
        }
    }

    pub fn vertices(&self) -> [Vec3; 3] {
        [Vec3::from(self.a), Vec3::from(self.b), Vec3::from(self.c)]
    }

    /// Unit face normal following the winding, or zero if degenerate.
    pub fn normal(&self) -> Vec3 {
        let [a, b, c] = self.vertices();
        (b - a).cross(c - a).normalize_or_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride() {
        assert_eq!(Triangle::STRIDE, 36);
    }

    #[test]
    fn test_normal_follows_winding() {
        let t = Triangle::new(Vec3::ZERO, Vec3::X, Vec3::Y);
        assert_eq!(t.normal(), Vec3::Z);
        let flipped = Triangle::new(Vec3::ZERO, Vec3::Y, Vec3::X);
        assert_eq!(flipped.normal(), -Vec3::Z);
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        let t = Triangle::new(Vec3::ONE, Vec3::ONE, Vec3::ONE);
        assert_eq!(t.normal(), Vec3::ZERO);
    }
}
