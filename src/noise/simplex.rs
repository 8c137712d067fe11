//! 3D gradient simplex noise with analytic derivatives.

use glam::Vec3;

use super::permutation::PermutationTable;

const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;

/// Squared kernel radius. Larger radii leak across simplex boundaries.
const RADIUS_SQ: f32 = 0.5;

/// Output scale that maps the kernel sum into roughly [-1, 1].
const SCALE: f32 = 76.0;

const GRAD3: [Vec3; 12] = [
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(-1.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, -1.0),
    Vec3::new(-1.0, 0.0, -1.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(0.0, -1.0, 1.0),
    Vec3::new(0.0, 1.0, -1.0),
    Vec3::new(0.0, -1.0, -1.0),
];

/// Samples simplex noise at `p`.
///
/// # Returns
/// A value in approximately [-1, 1]
#[inline]
pub fn simplex3(perm: &PermutationTable, p: Vec3) -> f32 {
    simplex3_with_derivative(perm, p).0
}

/// Samples simplex noise at `p` together with its spatial gradient.
///
/// # Arguments
/// * `perm` - Lattice hash table
/// * `p` - Sample position in noise space
///
/// # Returns
/// `(value, gradient)` where value is in approximately [-1, 1]
pub fn simplex3_with_derivative(perm: &PermutationTable, p: Vec3) -> (f32, Vec3) {
    // Skew into simplex cell space.
    let s = (p.x + p.y + p.z) * F3;
    let i = (p.x + s).floor();
    let j = (p.y + s).floor();
    let k = (p.z + s).floor();
    let t = (i + j + k) * G3;
    let d0 = p - Vec3::new(i - t, j - t, k - t);

    let (o1, o2) = simplex_offsets(d0);
    let d1 = d0 - o1 + Vec3::splat(G3);
    let d2 = d0 - o2 + Vec3::splat(2.0 * G3);
    let d3 = d0 - Vec3::ONE + Vec3::splat(3.0 * G3);

    let ii = (i as i32 & 255) as usize;
    let jj = (j as i32 & 255) as usize;
    let kk = (k as i32 & 255) as usize;
    let gradient = |di: usize, dj: usize, dk: usize| {
        let h = perm.hash(ii + di + perm.hash(jj + dj + perm.hash(kk + dk)));
        GRAD3[h % 12]
    };

    let corners = [
        (gradient(0, 0, 0), d0),
        (gradient(o1.x as usize, o1.y as usize, o1.z as usize), d1),
        (gradient(o2.x as usize, o2.y as usize, o2.z as usize), d2),
        (gradient(1, 1, 1), d3),
    ];

    let mut value = 0.0;
    let mut derivative = Vec3::ZERO;
    for (g, d) in corners {
        let t = RADIUS_SQ - d.length_squared();
        if t <= 0.0 {
            continue;
        }
        let t2 = t * t;
        let t4 = t2 * t2;
        let gd = g.dot(d);
        value += t4 * gd;
        derivative += -8.0 * t2 * t * gd * d + t4 * g;
    }

    (SCALE * value, SCALE * derivative)
}

/// Offsets of the second and third simplex corners, ranked by coordinate.
fn simplex_offsets(d: Vec3) -> (Vec3, Vec3) {
    if d.x >= d.y {
        if d.y >= d.z {
            (Vec3::X, Vec3::new(1.0, 1.0, 0.0))
        } else if d.x >= d.z {
            (Vec3::X, Vec3::new(1.0, 0.0, 1.0))
        } else {
            (Vec3::Z, Vec3::new(1.0, 0.0, 1.0))
        }
    } else if d.y < d.z {
        (Vec3::Z, Vec3::new(0.0, 1.0, 1.0))
    } else if d.x < d.z {
        (Vec3::Y, Vec3::new(0.0, 1.0, 1.0))
    } else {
        (Vec3::Y, Vec3::new(1.0, 1.0, 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simplex_range() {
        let perm = PermutationTable::new(1);
        for i in 0..2000 {
            let p = Vec3::new(i as f32 * 0.173, i as f32 * -0.091, i as f32 * 0.057);
            let v = simplex3(&perm, p);
            assert!((-1.05..=1.05).contains(&v), "Noise value {} out of range at {:?}", v, p);
        }
    }

    #[test]
    fn test_simplex_zero_at_lattice_origin() {
        let perm = PermutationTable::standard();
        assert!(simplex3(&perm, Vec3::ZERO).abs() < 1e-6);
    }

    #[test]
    fn test_derivative_matches_finite_difference() {
        let perm = PermutationTable::new(5);
        let h = 1e-3;
        for p in [
            Vec3::new(0.31, 1.7, -2.2),
            Vec3::new(12.5, -3.3, 0.8),
            Vec3::new(-7.1, 4.4, 9.9),
        ] {
            let (_, grad) = simplex3_with_derivative(&perm, p);
            let fd = Vec3::new(
                simplex3(&perm, p + Vec3::X * h) - simplex3(&perm, p - Vec3::X * h),
                simplex3(&perm, p + Vec3::Y * h) - simplex3(&perm, p - Vec3::Y * h),
                simplex3(&perm, p + Vec3::Z * h) - simplex3(&perm, p - Vec3::Z * h),
            ) / (2.0 * h);
            assert!(
                (grad - fd).length() < 0.05 * (1.0 + fd.length()),
                "Analytic gradient {:?} disagrees with finite difference {:?}",
                grad,
                fd
            );
        }
    }

    #[test]
    fn test_simplex_negative_coordinates_deterministic() {
        let perm = PermutationTable::new(11);
        let p = Vec3::new(-1234.5, -0.25, -98.75);
        assert_eq!(simplex3(&perm, p).to_bits(), simplex3(&perm, p).to_bits());
    }
}
