//! [`Device`] over a live OpenGL 3.3 core context through `glow`.
//!
//! The windowing collaborator creates the context and makes it current, then
//! hands it over together with a callback that swaps the window's buffers.

use std::collections::VecDeque;

use glow::HasContext;

use crate::device::{
    ClearMask, DepthFunc, Device, PixelFormat, PrimitiveKind, SamplerConfig, ShaderStage,
    TextureFilter, TextureWrap, INVALID_VALUE,
};
use crate::vertex::VertexAttribute;

/// Presents a finished frame, e.g. `surface.swap_buffers(&context)`.
pub type PresentFn = Box<dyn FnMut()>;

/// Wraps a `glow::Context` that is current on the calling thread.
pub struct GlowDevice {
    gl: glow::Context,
    present: Option<PresentFn>,
    /// Calls refused before reaching the driver, reported through `get_error`.
    rejected: VecDeque<u32>,
}

impl GlowDevice {
    /// Wraps `gl`. Frames are not swapped; use [`GlowDevice::with_present`]
    /// when drawing to a window.
    pub fn new(gl: glow::Context) -> Self {
        Self {
            gl,
            present: None,
            rejected: VecDeque::new(),
        }
    }

    pub fn with_present(gl: glow::Context, present: PresentFn) -> Self {
        Self {
            gl,
            present: Some(present),
            rejected: VecDeque::new(),
        }
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn into_gl(self) -> glow::Context {
        self.gl
    }
}

fn stage_enum(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn primitive_enum(kind: PrimitiveKind) -> u32 {
    match kind {
        PrimitiveKind::Triangles => glow::TRIANGLES,
        PrimitiveKind::TriangleStrip => glow::TRIANGLE_STRIP,
        PrimitiveKind::Lines => glow::LINES,
        PrimitiveKind::Points => glow::POINTS,
    }
}

fn depth_enum(func: DepthFunc) -> u32 {
    match func {
        DepthFunc::Less => glow::LESS,
        DepthFunc::LessEqual => glow::LEQUAL,
        DepthFunc::Always => glow::ALWAYS,
    }
}

fn wrap_enum(wrap: TextureWrap) -> i32 {
    (match wrap {
        TextureWrap::Repeat => glow::REPEAT,
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
    }) as i32
}

fn min_filter_enum(filter: TextureFilter, mipmaps: bool) -> i32 {
    (match (filter, mipmaps) {
        (TextureFilter::Nearest, false) => glow::NEAREST,
        (TextureFilter::Linear, false) => glow::LINEAR,
        (TextureFilter::Nearest, true) => glow::NEAREST_MIPMAP_LINEAR,
        (TextureFilter::Linear, true) => glow::LINEAR_MIPMAP_LINEAR,
    }) as i32
}

fn mag_filter_enum(filter: TextureFilter) -> i32 {
    (match filter {
        TextureFilter::Nearest => glow::NEAREST,
        TextureFilter::Linear => glow::LINEAR,
    }) as i32
}

/// GL dimensions for an upload of `len` bytes, or `None` when the slice does
/// not hold exactly `width * height` pixels or a side exceeds `i32::MAX`.
fn upload_extent(width: u32, height: u32, format: PixelFormat, len: usize) -> Option<(i32, i32)> {
    let expected = (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(format.bytes_per_pixel())?;
    if len != expected {
        return None;
    }
    Some((i32::try_from(width).ok()?, i32::try_from(height).ok()?))
}

fn pixel_format_enums(format: PixelFormat) -> (i32, u32) {
    match format {
        PixelFormat::Rgb8 => (glow::RGB8 as i32, glow::RGB),
        PixelFormat::Rgba8 => (glow::RGBA8 as i32, glow::RGBA),
    }
}

// SAFETY (applies to every block below): glow exposes raw GL entry points as
// unsafe. The context is current on this thread for the device's lifetime and
// every handle passed in was created by this same context.
#[allow(unsafe_code)]
impl Device for GlowDevice {
    type Buffer = glow::Buffer;
    type VertexArray = glow::VertexArray;
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Texture = glow::Texture;
    type UniformLocation = glow::UniformLocation;

    fn create_buffer(&mut self) -> Result<glow::Buffer, String> {
        // SAFETY: see impl comment.
        unsafe { self.gl.create_buffer() }
    }

    fn bind_array_buffer(&mut self, buffer: Option<glow::Buffer>) {
        // SAFETY: see impl comment.
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, buffer) }
    }

    fn buffer_data_static(&mut self, data: &[f32]) {
        let bytes: Vec<u8> = data.iter().flat_map(|f| f.to_ne_bytes()).collect();
        // SAFETY: see impl comment. `bytes` outlives the call.
        unsafe {
            self.gl
                .buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW)
        }
    }

    fn delete_buffer(&mut self, buffer: glow::Buffer) {
        // SAFETY: see impl comment.
        unsafe { self.gl.delete_buffer(buffer) }
    }

    fn create_vertex_array(&mut self) -> Result<glow::VertexArray, String> {
        // SAFETY: see impl comment.
        unsafe { self.gl.create_vertex_array() }
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<glow::VertexArray>) {
        // SAFETY: see impl comment.
        unsafe { self.gl.bind_vertex_array(vertex_array) }
    }

    fn vertex_attrib_pointer_f32(&mut self, attribute: &VertexAttribute) {
        // SAFETY: see impl comment. Offsets are validated against the stride
        // by `VertexLayout` and index into the bound array buffer.
        unsafe {
            self.gl.vertex_attrib_pointer_f32(
                attribute.index,
                attribute.components as i32,
                glow::FLOAT,
                false,
                attribute.stride_bytes as i32,
                attribute.offset_bytes as i32,
            )
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        // SAFETY: see impl comment.
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn delete_vertex_array(&mut self, vertex_array: glow::VertexArray) {
        // SAFETY: see impl comment.
        unsafe { self.gl.delete_vertex_array(vertex_array) }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<glow::Shader, String> {
        // SAFETY: see impl comment.
        unsafe { self.gl.create_shader(stage_enum(stage)) }
    }

    fn shader_source(&mut self, shader: glow::Shader, source: &str) {
        // SAFETY: see impl comment.
        unsafe { self.gl.shader_source(shader, source) }
    }

    fn compile_shader(&mut self, shader: glow::Shader) {
        // SAFETY: see impl comment.
        unsafe { self.gl.compile_shader(shader) }
    }

    fn get_shader_compile_status(&mut self, shader: glow::Shader) -> bool {
        // SAFETY: see impl comment.
        unsafe { self.gl.get_shader_compile_status(shader) }
    }

    fn get_shader_info_log(&mut self, shader: glow::Shader) -> String {
        // SAFETY: see impl comment.
        unsafe { self.gl.get_shader_info_log(shader) }
    }

    fn delete_shader(&mut self, shader: glow::Shader) {
        // SAFETY: see impl comment.
        unsafe { self.gl.delete_shader(shader) }
    }

    fn create_program(&mut self) -> Result<glow::Program, String> {
        // SAFETY: see impl comment.
        unsafe { self.gl.create_program() }
    }

    fn attach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        // SAFETY: see impl comment.
        unsafe { self.gl.attach_shader(program, shader) }
    }

    fn detach_shader(&mut self, program: glow::Program, shader: glow::Shader) {
        // SAFETY: see impl comment.
        unsafe { self.gl.detach_shader(program, shader) }
    }

    fn link_program(&mut self, program: glow::Program) {
        // SAFETY: see impl comment.
        unsafe { self.gl.link_program(program) }
    }

    fn get_program_link_status(&mut self, program: glow::Program) -> bool {
        // SAFETY: see impl comment.
        unsafe { self.gl.get_program_link_status(program) }
    }

    fn get_program_info_log(&mut self, program: glow::Program) -> String {
        // SAFETY: see impl comment.
        unsafe { self.gl.get_program_info_log(program) }
    }

    fn use_program(&mut self, program: Option<glow::Program>) {
        // SAFETY: see impl comment.
        unsafe { self.gl.use_program(program) }
    }

    fn delete_program(&mut self, program: glow::Program) {
        // SAFETY: see impl comment.
        unsafe { self.gl.delete_program(program) }
    }

    fn get_uniform_location(
        &mut self,
        program: glow::Program,
        name: &str,
    ) -> Option<glow::UniformLocation> {
        // SAFETY: see impl comment.
        unsafe { self.gl.get_uniform_location(program, name) }
    }

    fn uniform_matrix_4_f32(&mut self, location: &glow::UniformLocation, value: &[f32; 16]) {
        // SAFETY: see impl comment. Column-major, so no transpose.
        unsafe {
            self.gl
                .uniform_matrix_4_f32_slice(Some(location), false, value)
        }
    }

    fn uniform_3_f32(&mut self, location: &glow::UniformLocation, value: [f32; 3]) {
        let [x, y, z] = value;
        // SAFETY: see impl comment.
        unsafe { self.gl.uniform_3_f32(Some(location), x, y, z) }
    }

    fn uniform_1_i32(&mut self, location: &glow::UniformLocation, value: i32) {
        // SAFETY: see impl comment.
        unsafe { self.gl.uniform_1_i32(Some(location), value) }
    }

    fn create_texture(&mut self) -> Result<glow::Texture, String> {
        // SAFETY: see impl comment.
        unsafe { self.gl.create_texture() }
    }

    fn active_texture(&mut self, unit: u32) {
        // SAFETY: see impl comment.
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture_2d(&mut self, texture: Option<glow::Texture>) {
        // SAFETY: see impl comment.
        unsafe { self.gl.bind_texture(glow::TEXTURE_2D, texture) }
    }

    fn tex_parameters(&mut self, sampler: &SamplerConfig) {
        let params = [
            (glow::TEXTURE_WRAP_S, wrap_enum(sampler.wrap_s)),
            (glow::TEXTURE_WRAP_T, wrap_enum(sampler.wrap_t)),
            (
                glow::TEXTURE_MIN_FILTER,
                min_filter_enum(sampler.min_filter, sampler.mipmaps),
            ),
            (glow::TEXTURE_MAG_FILTER, mag_filter_enum(sampler.mag_filter)),
        ];
        for (name, value) in params {
            // SAFETY: see impl comment.
            unsafe { self.gl.tex_parameter_i32(glow::TEXTURE_2D, name, value) }
        }
    }

    fn tex_image_2d(&mut self, width: u32, height: u32, format: PixelFormat, pixels: &[u8]) {
        let Some((gl_width, gl_height)) = upload_extent(width, height, format, pixels.len()) else {
            log::error!(
                "refusing {width}x{height} {format:?} upload from {} byte(s)",
                pixels.len()
            );
            self.rejected.push_back(INVALID_VALUE);
            return;
        };
        let (internal_format, pixel_format) = pixel_format_enums(format);
        // SAFETY: see impl comment. `pixels` holds exactly the bytes GL reads
        // for this size, and rows are tightly packed, so unpack alignment is 1
        // for RGB data of any width.
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                internal_format,
                gl_width,
                gl_height,
                0,
                pixel_format,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            );
        }
    }

    fn generate_mipmap_2d(&mut self) {
        // SAFETY: see impl comment.
        unsafe { self.gl.generate_mipmap(glow::TEXTURE_2D) }
    }

    fn delete_texture(&mut self, texture: glow::Texture) {
        // SAFETY: see impl comment.
        unsafe { self.gl.delete_texture(texture) }
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        let [r, g, b, a] = rgba;
        // SAFETY: see impl comment.
        unsafe { self.gl.clear_color(r, g, b, a) }
    }

    fn enable_depth_test(&mut self, func: DepthFunc) {
        // SAFETY: see impl comment.
        unsafe {
            self.gl.enable(glow::DEPTH_TEST);
            self.gl.depth_func(depth_enum(func));
        }
    }

    fn enable_back_face_culling(&mut self) {
        // SAFETY: see impl comment.
        unsafe {
            self.gl.enable(glow::CULL_FACE);
            self.gl.cull_face(glow::BACK);
            self.gl.front_face(glow::CCW);
        }
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        // SAFETY: see impl comment.
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear(&mut self, mask: ClearMask) {
        let mut bits = 0;
        if mask.color {
            bits |= glow::COLOR_BUFFER_BIT;
        }
        if mask.depth {
            bits |= glow::DEPTH_BUFFER_BIT;
        }
        // SAFETY: see impl comment.
        unsafe { self.gl.clear(bits) }
    }

    fn draw_arrays(&mut self, mode: PrimitiveKind, first: i32, count: i32) {
        // SAFETY: see impl comment. The caller binds a vertex array whose
        // buffer holds at least `first + count` vertices.
        unsafe { self.gl.draw_arrays(primitive_enum(mode), first, count) }
    }

    fn get_error(&mut self) -> Option<u32> {
        if let Some(code) = self.rejected.pop_front() {
            return Some(code);
        }
        // SAFETY: see impl comment.
        let code = unsafe { self.gl.get_error() };
        (code != glow::NO_ERROR).then_some(code)
    }

    fn present(&mut self) {
        if let Some(present) = self.present.as_mut() {
            present();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_map_to_gl_constants() {
        assert_eq!(stage_enum(ShaderStage::Vertex), glow::VERTEX_SHADER);
        assert_eq!(primitive_enum(PrimitiveKind::Triangles), glow::TRIANGLES);
        assert_eq!(depth_enum(DepthFunc::Less), glow::LESS);
        assert_eq!(wrap_enum(TextureWrap::Repeat), glow::REPEAT as i32);
    }

    #[test]
    fn default_sampler_uses_trilinear_minification() {
        let s = SamplerConfig::default();
        assert_eq!(
            min_filter_enum(s.min_filter, s.mipmaps),
            glow::LINEAR_MIPMAP_LINEAR as i32
        );
        assert_eq!(mag_filter_enum(s.mag_filter), glow::LINEAR as i32);
    }

    #[test]
    fn rgb_uploads_use_rgb8_internal_format() {
        assert_eq!(
            pixel_format_enums(PixelFormat::Rgb8),
            (glow::RGB8 as i32, glow::RGB)
        );
    }

    #[test]
    fn gl_error_codes_match_device_constants() {
        assert_eq!(glow::OUT_OF_MEMORY, crate::device::OUT_OF_MEMORY);
        assert_eq!(glow::INVALID_OPERATION, crate::device::INVALID_OPERATION);
        assert_eq!(glow::INVALID_VALUE, crate::device::INVALID_VALUE);
        assert_eq!(glow::INVALID_ENUM, crate::device::INVALID_ENUM);
    }

    #[test]
    fn upload_extent_requires_exact_byte_count() {
        assert_eq!(upload_extent(4, 4, PixelFormat::Rgba8, 64), Some((4, 4)));
        assert_eq!(upload_extent(3, 2, PixelFormat::Rgb8, 18), Some((3, 2)));
        assert_eq!(upload_extent(4, 4, PixelFormat::Rgba8, 4), None);
        assert_eq!(upload_extent(4, 4, PixelFormat::Rgba8, 65), None);
    }

    #[test]
    fn upload_extent_rejects_sizes_gl_cannot_express() {
        let side = i32::MAX as u32 + 1;
        assert_eq!(upload_extent(side, 1, PixelFormat::Rgb8, side as usize * 3), None);
        assert_eq!(upload_extent(u32::MAX, u32::MAX, PixelFormat::Rgba8, 0), None);
    }
}
