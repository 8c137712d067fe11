//! 16-bit PNG export of height tiles and alphamap layers.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ImageBuffer, ImageEncoder, Luma};
use thiserror::Error;

use crate::field::{HeightField, SplatField};
use crate::terrain::HeightTile;

/// Errors that can occur during PNG export.
#[derive(Error, Debug)]
pub enum PngExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid value range: min ({0}) >= max ({1})")]
    InvalidRange(f32, f32),
    #[error("Layer {layer} out of range for a field with {layers} layers")]
    MissingLayer { layer: usize, layers: usize },
}

/// Options for PNG export.
#[derive(Debug, Clone)]
pub struct PngExportOptions {
    /// Value mapped to black.
    pub min_value: f32,
    /// Value mapped to white.
    pub max_value: f32,
    pub compression: CompressionType,
    pub filter: FilterType,
}

impl Default for PngExportOptions {
    fn default() -> Self {
        Self {
            min_value: 0.0,
            max_value: 1.0,
            compression: CompressionType::Default,
            filter: FilterType::Adaptive,
        }
    }
}

impl PngExportOptions {
    /// Options stretching the height range of `field` over the full scale.
    pub fn auto_range(field: &HeightField) -> Self {
        let (min, max) = field.height_range();
        Self {
            min_value: min,
            max_value: max,
            ..Default::default()
        }
    }
}

/// Exports a height field as a 16-bit grayscale PNG, row `z` per image row.
///
/// # Arguments
/// * `field` - Heights to export
/// * `path` - Output file path
/// * `options` - Value range for normalization and encoder settings
pub fn export_height_png(
    field: &HeightField,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), PngExportError> {
    write_l16(field.size(), |x, y| field.get(x, y), path, options)
}

/// Exports one alphamap layer as a 16-bit grayscale PNG.
pub fn export_splat_layer_png(
    field: &SplatField,
    layer: usize,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), PngExportError> {
    if layer >= field.layers() {
        return Err(PngExportError::MissingLayer {
            layer,
            layers: field.layers(),
        });
    }
    write_l16(field.size(), |x, y| field.get(x, y, layer), path, options)
}

/// Exports a tile's heightmap and every alphamap layer.
///
/// Files are named `{base_name}_height.png` and `{base_name}_splat{n}.png`.
/// Heights use `options`; alphamaps always span [0, 1].
///
/// # Returns
/// The number of files written.
pub fn export_tile_png(
    tile: &HeightTile,
    output_dir: &Path,
    base_name: &str,
    options: &PngExportOptions,
) -> Result<usize, PngExportError> {
    std::fs::create_dir_all(output_dir)?;
    export_height_png(
        &tile.heights,
        &output_dir.join(format!("{}_height.png", base_name)),
        options,
    )?;

    let unit = PngExportOptions {
        min_value: 0.0,
        max_value: 1.0,
        ..options.clone()
    };
    for layer in 0..tile.alphamaps.layers() {
        let path = output_dir.join(format!("{}_splat{}.png", base_name, layer));
        export_splat_layer_png(&tile.alphamaps, layer, &path, &unit)?;
    }
    Ok(1 + tile.alphamaps.layers())
}

fn write_l16(
    size: usize,
    sample: impl Fn(usize, usize) -> f32,
    path: &Path,
    options: &PngExportOptions,
) -> Result<(), PngExportError> {
    let (min, max) = (options.min_value, options.max_value);
    if !(min < max) {
        return Err(PngExportError::InvalidRange(min, max));
    }
    let range = max - min;
    let side = size as u32;

    let img: ImageBuffer<Luma<u16>, Vec<u16>> = ImageBuffer::from_fn(side, side, |x, y| {
        let normalized = ((sample(x as usize, y as usize) - min) / range).clamp(0.0, 1.0);
        Luma([(normalized * 65535.0) as u16])
    });

    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    let encoder = PngEncoder::new_with_quality(writer, options.compression, options.filter);
    let byte_slice: &[u8] = bytemuck::cast_slice(img.as_raw());
    encoder.write_image(byte_slice, side, side, image::ExtendedColorType::L16)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldStatus;
    use glam::Vec3;
    use tempfile::tempdir;

    fn ramp(size: usize) -> HeightField {
        let heights = (0..size * size).map(|i| (i % size) as f32 / (size - 1) as f32).collect();
        HeightField::new(size, Vec3::ZERO, Vec3::ONE, heights, FieldStatus::default())
    }

    #[test]
    fn test_export_height_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("height.png");
        export_height_png(&ramp(17), &path, &PngExportOptions::default()).unwrap();

        let img = image::open(&path).unwrap().into_luma16();
        assert_eq!(img.dimensions(), (17, 17));
        assert_eq!(img.get_pixel(0, 5)[0], 0);
        assert_eq!(img.get_pixel(16, 5)[0], 65535, "Column x maps to image x");
    }

    #[test]
    fn test_invalid_range() {
        let dir = tempdir().unwrap();
        let options = PngExportOptions {
            min_value: 1.0,
            max_value: 1.0,
            ..Default::default()
        };
        let result = export_height_png(&ramp(4), &dir.path().join("x.png"), &options);
        assert!(matches!(result, Err(PngExportError::InvalidRange(_, _))));
    }

    #[test]
    fn test_missing_layer() {
        let field = SplatField::new(4, 2, vec![0.5; 32], FieldStatus::default());
        let dir = tempdir().unwrap();
        let result = export_splat_layer_png(&field, 2, &dir.path().join("s.png"), &PngExportOptions::default());
        assert!(matches!(result, Err(PngExportError::MissingLayer { layer: 2, layers: 2 })));
    }

    #[test]
    fn test_export_tile_writes_every_layer() {
        let tile = HeightTile {
            center: Vec3::ZERO,
            heights: ramp(9),
            alphamaps: SplatField::new(8, 3, vec![0.25; 8 * 8 * 3], FieldStatus::default()),
        };
        let dir = tempdir().unwrap();
        let written = export_tile_png(&tile, dir.path(), "tile", &PngExportOptions::auto_range(&tile.heights)).unwrap();
        assert_eq!(written, 4);
        for name in ["tile_height.png", "tile_splat0.png", "tile_splat1.png", "tile_splat2.png"] {
            assert!(dir.path().join(name).exists(), "Missing {}", name);
        }
    }
}
