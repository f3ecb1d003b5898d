//! 2D textures uploaded from decoded pixel data.
//!
//! Decoders hand over rows top-to-bottom. GL addresses texture rows from the
//! bottom, so [`TextureResource::upload`] flips rows before the upload and
//! texture coordinate `(0, 0)` lands on the image's bottom-left corner.

use crate::device::{check_error, Device, PixelFormat, SamplerConfig};
use crate::error::RenderError;

/// Decoded pixels in top-to-bottom row order, as an image decoder produces.
///
/// The byte length always matches the dimensions: the only constructors are
/// [`PixelData::new`], which checks it, and [`PixelData::checkerboard`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelData {
    width: u32,
    height: u32,
    format: PixelFormat,
    bytes: Vec<u8>,
}

impl PixelData {
    /// Wraps decoded bytes, checking the length against the dimensions.
    pub fn new(width: u32, height: u32, format: PixelFormat, bytes: Vec<u8>) -> Result<Self, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidTexture(format!(
                "texture size {width}x{height} is empty"
            )));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if bytes.len() != expected {
            return Err(RenderError::InvalidTexture(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            bytes,
        })
    }

    /// An RGBA8 checkerboard of `cells` x `cells` squares alternating between
    /// `a` and `b`, starting with `a` in the top-left corner.
    pub fn checkerboard(size: u32, cells: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let bytes = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x / cell + y / cell) % 2))
            .flat_map(|parity| if parity == 0 { a } else { b })
            .collect();
        Self {
            width: size,
            height: size,
            format: PixelFormat::Rgba8,
            bytes,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Pixel bytes, top row first.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Reverses the row order of a tightly packed image in place.
pub fn flip_rows_vertically(bytes: &mut [u8], row_bytes: usize) {
    if row_bytes == 0 {
        return;
    }
    let rows = bytes.len() / row_bytes;
    for top in 0..rows / 2 {
        let bottom = rows - 1 - top;
        let (upper, lower) = bytes.split_at_mut(bottom * row_bytes);
        upper[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut lower[..row_bytes]);
    }
}

/// One GPU texture handle. Sampler state and mip levels are fixed at upload.
pub struct TextureResource<D: Device> {
    texture: Option<D::Texture>,
    width: u32,
    height: u32,
    sampler: SamplerConfig,
}

impl<D: Device> TextureResource<D> {
    /// Flips `pixels` to bottom-up order, uploads them and configures the
    /// sampler. Mipmaps are generated before this returns when
    /// `sampler.mipmaps` is set. The pixel data is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::ResourceCreation`] if the driver refuses the
    /// texture or reports an error during upload.
    pub fn upload(device: &mut D, pixels: PixelData, sampler: SamplerConfig) -> Result<Self, RenderError> {
        let PixelData {
            width,
            height,
            format,
            mut bytes,
        } = pixels;
        flip_rows_vertically(&mut bytes, width as usize * format.bytes_per_pixel());

        let texture = device
            .create_texture()
            .map_err(|e| RenderError::resource("texture", e))?;
        let mut resource = Self {
            texture: Some(texture),
            width,
            height,
            sampler,
        };

        device.active_texture(0);
        device.bind_texture_2d(Some(texture));
        device.tex_parameters(&sampler);
        device.tex_image_2d(width, height, format, &bytes);
        if sampler.mipmaps {
            device.generate_mipmap_2d();
        }
        device.bind_texture_2d(None);

        if let Err(e) = check_error(device, "texture") {
            resource.release(device);
            return Err(e);
        }

        log::debug!("uploaded {width}x{height} {format:?} texture {texture:?}");
        Ok(resource)
    }

    /// Binds the texture to `unit` for the current frame.
    pub fn bind(&self, device: &mut D, unit: u32) {
        if let Some(texture) = self.texture {
            device.active_texture(unit);
            device.bind_texture_2d(Some(texture));
        }
    }

    pub fn unbind(&self, device: &mut D, unit: u32) {
        device.active_texture(unit);
        device.bind_texture_2d(None);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn sampler(&self) -> &SamplerConfig {
        &self.sampler
    }

    pub fn handle(&self) -> Option<D::Texture> {
        self.texture
    }

    /// Unbinds and deletes the texture. Further calls are no-ops.
    pub fn release(&mut self, device: &mut D) {
        if let Some(texture) = self.texture.take() {
            device.bind_texture_2d(None);
            device.delete_texture(texture);
            log::debug!("released texture {texture:?}");
        }
    }

    pub fn is_released(&self) -> bool {
        self.texture.is_none()
    }
}

impl<D: Device> Drop for TextureResource<D> {
    fn drop(&mut self) {
        if let Some(texture) = self.texture {
            log::warn!("texture {texture:?} dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn flip_reverses_row_order() {
        let mut bytes = vec![1, 1, 2, 2, 3, 3];
        flip_rows_vertically(&mut bytes, 2);
        assert_eq!(bytes, vec![3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn flip_single_row_is_unchanged() {
        let mut bytes = vec![9, 8, 7];
        flip_rows_vertically(&mut bytes, 3);
        assert_eq!(bytes, vec![9, 8, 7]);
    }

    #[test]
    fn pixel_data_rejects_wrong_length() {
        let err = PixelData::new(2, 2, PixelFormat::Rgba8, vec![0; 15]).unwrap_err();
        assert!(matches!(err, RenderError::InvalidTexture(_)));
        assert!(PixelData::new(0, 4, PixelFormat::Rgb8, Vec::new()).is_err());
    }

    #[test]
    fn short_buffer_never_reaches_the_device() {
        let err = PixelData::new(4, 4, PixelFormat::Rgba8, vec![0; 4]).unwrap_err();
        assert!(
            matches!(&err, RenderError::InvalidTexture(msg) if msg.contains("needs 64 bytes, got 4")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let board = PixelData::checkerboard(4, 2, RED, BLUE);
        let bytes = board.bytes();
        assert_eq!(bytes.len(), 4 * 4 * 4);
        assert_eq!((board.width(), board.height()), (4, 4));
        assert_eq!(&bytes[0..4], &RED, "top-left is the first color");
        assert_eq!(&bytes[8..12], &BLUE, "next cell to the right");
        assert_eq!(&bytes[(2 * 4) * 4..(2 * 4) * 4 + 4], &BLUE, "next cell down");
    }

    #[test]
    fn upload_puts_top_row_at_high_v() {
        let mut dev = SoftwareDevice::new(4, 4);
        // Top row red, bottom row blue.
        let bytes = [RED, RED, BLUE, BLUE].concat();
        let pixels = PixelData::new(2, 2, PixelFormat::Rgba8, bytes).unwrap();
        let mut tex = TextureResource::upload(&mut dev, pixels, SamplerConfig::default()).unwrap();
        let handle = tex.handle().unwrap();
        assert_eq!(dev.texel(handle, 0, 0), Some(BLUE), "v = 0 is the image bottom");
        assert_eq!(dev.texel(handle, 0, 1), Some(RED));
        tex.release(&mut dev);
    }

    #[test]
    fn upload_generates_mipmaps_by_default() {
        let mut dev = SoftwareDevice::new(4, 4);
        let pixels = PixelData::checkerboard(16, 4, RED, BLUE);
        let mut tex = TextureResource::upload(&mut dev, pixels, SamplerConfig::default()).unwrap();
        let info = dev.texture_info(tex.handle().unwrap()).unwrap();
        assert_eq!(info.mip_levels, 5);
        assert_eq!(info.sampler, SamplerConfig::default());
        tex.release(&mut dev);
    }

    #[test]
    fn upload_failure_releases_texture() {
        let mut dev = SoftwareDevice::new(4, 4);
        dev.simulate_out_of_memory(true);
        let pixels = PixelData::checkerboard(8, 2, RED, BLUE);
        let result = TextureResource::upload(&mut dev, pixels, SamplerConfig::default());
        assert!(matches!(result, Err(RenderError::ResourceCreation { .. })));
        assert_eq!(dev.live_objects().textures, 0);
    }

    #[test]
    fn bind_attaches_to_requested_unit() {
        let mut dev = SoftwareDevice::new(4, 4);
        let pixels = PixelData::checkerboard(2, 2, RED, BLUE);
        let mut tex = TextureResource::upload(&mut dev, pixels, SamplerConfig::default()).unwrap();
        tex.bind(&mut dev, 3);
        assert_eq!(dev.texture_on_unit(3), tex.handle());
        tex.release(&mut dev);
        tex.release(&mut dev);
        assert_eq!(dev.texture_on_unit(3), None);
    }
}
