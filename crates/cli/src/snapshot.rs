//! PNG output of presented frames.

use std::path::{Path, PathBuf};

use crate::error::CliError;

/// File name for frame `index` inside `dir`.
pub fn frame_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("frame_{index:04}.png"))
}

/// Writes tightly packed RGBA8 rows, top row first, as a PNG.
pub fn write_png(rgba: Vec<u8>, width: u32, height: u32, path: &Path) -> Result<(), CliError> {
    let img = image::RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| CliError::Io("RGBA buffer size mismatch".into()))?;
    img.save(path)
        .map_err(|e| CliError::Io(format!("{}: {e}", path.display())))?;
    log::debug!("wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_paths_are_zero_padded() {
        let path = frame_path(Path::new("out"), 7);
        assert_eq!(path, Path::new("out").join("frame_0007.png"));
    }

    #[test]
    fn write_png_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.png");
        let mut rgba = vec![0u8; 4 * 3 * 4];
        rgba[..4].copy_from_slice(&[255, 0, 0, 255]);

        write_png(rgba, 4, 3, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgba8();
        assert_eq!((img.width(), img.height()), (4, 3));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn write_png_rejects_short_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_png(vec![0; 5], 4, 4, &dir.path().join("x.png")).unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }
}
