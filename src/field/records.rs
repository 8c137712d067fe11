//! Fixed-layout records uploaded to compute backends.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::noise::{ErosionBlend, ErosionParams, NoiseLayer};

/// A noise layer as stored in the `Noises` buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct NoiseLayerRecord {
    pub octaves: u32,
    pub scale: f32,
    pub persistence: f32,
    pub octave_lacunarity: f32,
    pub offset: [f32; 4],
}

impl From<&NoiseLayer> for NoiseLayerRecord {
    fn from(layer: &NoiseLayer) -> Self {
        Self {
            octaves: layer.octaves,
            scale: layer.scale,
            persistence: layer.persistence,
            octave_lacunarity: layer.octave_lacunarity,
            offset: layer.offset.extend(0.0).to_array(),
        }
    }
}

impl From<&NoiseLayerRecord> for NoiseLayer {
    fn from(record: &NoiseLayerRecord) -> Self {
        Self {
            octaves: record.octaves,
            scale: record.scale,
            persistence: record.persistence,
            octave_lacunarity: record.octave_lacunarity,
            offset: Vec3::new(record.offset[0], record.offset[1], record.offset[2]),
        }
    }
}

/// Erosion parameters as stored in the `Ubers` buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ErosionRecord {
    pub octaves: u32,
    pub perturb: f32,
    pub sharpness: f32,
    pub amplify: f32,
    pub altitude_erosion: f32,
    pub ridge_erosion: f32,
    pub slope_erosion: f32,
    pub lacunarity: f32,
    pub gain: f32,
    pub start_amplitude: f32,
    pub scale: f32,
    pub _pad: f32,
}

impl From<&ErosionParams> for ErosionRecord {
    fn from(p: &ErosionParams) -> Self {
        Self {
            octaves: p.octaves,
            perturb: p.perturb,
            sharpness: p.sharpness,
            amplify: p.amplify,
            altitude_erosion: p.altitude_erosion,
            ridge_erosion: p.ridge_erosion,
            slope_erosion: p.slope_erosion,
            lacunarity: p.lacunarity,
            gain: p.gain,
            start_amplitude: p.start_amplitude,
            scale: p.scale,
            _pad: 0.0,
        }
    }
}

impl From<&ErosionRecord> for ErosionParams {
    fn from(r: &ErosionRecord) -> Self {
        Self {
            octaves: r.octaves,
            perturb: r.perturb,
            sharpness: r.sharpness,
            amplify: r.amplify,
            altitude_erosion: r.altitude_erosion,
            ridge_erosion: r.ridge_erosion,
            slope_erosion: r.slope_erosion,
            lacunarity: r.lacunarity,
            gain: r.gain,
            start_amplitude: r.start_amplitude,
            scale: r.scale,
        }
    }
}

/// Integer code of an erosion blend mode.
pub fn blend_code(blend: ErosionBlend) -> i32 {
    match blend {
        ErosionBlend::Max => 0,
        ErosionBlend::Mean => 1,
    }
}

/// Blend mode of an integer code.
pub fn blend_from_code(code: i32) -> Option<ErosionBlend> {
    match code {
        0 => Some(ErosionBlend::Max),
        1 => Some(ErosionBlend::Mean),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes() {
        assert_eq!(std::mem::size_of::<NoiseLayerRecord>(), 32);
        assert_eq!(std::mem::size_of::<ErosionRecord>(), 48);
    }

    #[test]
    fn test_layer_conversion_lossless() {
        let layer = NoiseLayer::crater();
        assert_eq!(NoiseLayer::from(&NoiseLayerRecord::from(&layer)), layer);
    }

    #[test]
    fn test_blend_codes() {
        for blend in [ErosionBlend::Max, ErosionBlend::Mean] {
            assert_eq!(blend_from_code(blend_code(blend)), Some(blend));
        }
        assert_eq!(blend_from_code(7), None);
    }
}
