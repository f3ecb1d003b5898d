//! Texture decoding for `--texture`.

use std::path::Path;

use prism_engine_core::device::PixelFormat;
use prism_engine_core::PixelData;

use crate::error::CliError;

/// Decodes an image file to RGBA8 rows in top-to-bottom order.
pub fn load_texture(path: &Path) -> Result<PixelData, CliError> {
    let img = image::open(path)
        .map_err(|e| CliError::Input(format!("cannot decode texture {}: {e}", path.display())))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    let pixels = PixelData::new(width, height, PixelFormat::Rgba8, img.into_raw())?;
    log::info!("decoded texture {} ({width}x{height})", path.display());
    Ok(pixels)
}
