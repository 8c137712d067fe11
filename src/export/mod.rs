//! Export of generated terrain to image files.
//!
//! Heights and alphamap layers are written as 16-bit grayscale PNGs.

mod png;

pub use png::{
    export_height_png, export_splat_layer_png, export_tile_png, PngExportError,
    PngExportOptions,
};
