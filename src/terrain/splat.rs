//! Turning raw layer weights into terrain alphamaps.

use glam::Vec3;

use crate::field::{HeightField, SplatField};

/// Steepness in degrees of a height field at normalized coordinates.
///
/// # Arguments
/// * `heights` - Heights in [0, 1]
/// * `u`, `v` - Position along x and z, each in [0, 1]
/// * `extent` - World size of the field; `extent.y` scales heights
pub fn steepness(heights: &HeightField, u: f32, v: f32, extent: Vec3) -> f32 {
    let last = heights.size() - 1;
    let column = (u.clamp(0.0, 1.0) * last as f32).round() as usize;
    let row = (v.clamp(0.0, 1.0) * last as f32).round() as usize;
    let cell = Vec3::new(extent.x / last as f32, extent.y, extent.z / last as f32);

    let (x0, x1) = (column.saturating_sub(1), (column + 1).min(last));
    let (z0, z1) = (row.saturating_sub(1), (row + 1).min(last));
    let dx = (heights.get(x1, row) - heights.get(x0, row)) * cell.y / ((x1 - x0) as f32 * cell.x);
    let dz = (heights.get(column, z1) - heights.get(column, z0)) * cell.y / ((z1 - z0) as f32 * cell.z);
    (dx * dx + dz * dz).sqrt().atan().to_degrees()
}

/// Builds alphamaps from raw layer weights and terrain slope.
///
/// Layer 0 is the cliff layer and receives `(slope / slope_angle)^3`,
/// clamped to [0, 1]. The other layers share the remainder in proportion
/// to their squared weights, so every texel sums to one.
pub fn blend_alphamaps(raw: &SplatField, heights: &HeightField, extent: Vec3, slope_angle: f32) -> SplatField {
    let size = raw.size();
    let layers = raw.layers();
    let mut weights = Vec::with_capacity(size * size * layers);

    for y in 0..size {
        for x in 0..size {
            if layers == 1 {
                weights.push(1.0);
                continue;
            }
            let u = x as f32 / (size - 1) as f32;
            let v = y as f32 / (size - 1) as f32;
            let slope = (steepness(heights, u, v, extent) / slope_angle).clamp(0.0, 1.0);
            let slope = slope * slope * slope;

            let texel = raw.texel(x, y);
            let sum: f32 = texel[1..].iter().map(|w| w * w).sum();
            weights.push(slope);
            for w in &texel[1..] {
                let share = if sum > 0.0 {
                    w * w / sum
                } else {
                    1.0 / (layers - 1) as f32
                };
                weights.push(share * (1.0 - slope));
            }
        }
    }
    raw.with_weights(weights)
}
