//! The graphics API seam.
//!
//! [`Device`] mirrors the subset of an OpenGL-style context the engine needs:
//! object creation and deletion per class, bind-by-`Option`, shader
//! compile/link queries, uniform upload, fixed pipeline state, and the error
//! queue. Handles are associated types so each backend keeps its native
//! representation.
//!
//! Backends:
//! - [`SoftwareDevice`] -- deterministic CPU rasterizer, always available.
//! - `GlowDevice` -- live OpenGL through `glow` (feature `render`).

pub mod software;

pub use software::SoftwareDevice;

use std::fmt::Debug;

use crate::error::RenderError;
use crate::vertex::VertexAttribute;

/// GL error code: an enum argument was out of range.
pub const INVALID_ENUM: u32 = 0x0500;
/// GL error code: a numeric argument was out of range.
pub const INVALID_VALUE: u32 = 0x0501;
/// GL error code: the operation is not allowed in the current state.
pub const INVALID_OPERATION: u32 = 0x0502;
/// GL error code: not enough memory left to execute the command.
pub const OUT_OF_MEMORY: u32 = 0x0505;

/// Returns the symbolic name of a GL error code.
pub fn error_name(code: u32) -> &'static str {
    match code {
        INVALID_ENUM => "GL_INVALID_ENUM",
        INVALID_VALUE => "GL_INVALID_VALUE",
        INVALID_OPERATION => "GL_INVALID_OPERATION",
        OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        _ => "GL_UNKNOWN_ERROR",
    }
}

/// Programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Lower-case stage name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Primitive assembly mode for `draw_arrays`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    TriangleStrip,
    Lines,
    Points,
}

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFunc {
    Less,
    LessEqual,
    Always,
}

/// Texture coordinate wrap mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// Sampler state applied to the bound 2D texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerConfig {
    pub wrap_s: TextureWrap,
    pub wrap_t: TextureWrap,
    pub min_filter: TextureFilter,
    pub mag_filter: TextureFilter,
    /// Minification samples the mipmap chain when set.
    pub mipmaps: bool,
}

impl Default for SamplerConfig {
    /// Repeat wrapping, linear filtering, with mipmaps.
    fn default() -> Self {
        Self {
            wrap_s: TextureWrap::Repeat,
            wrap_t: TextureWrap::Repeat,
            min_filter: TextureFilter::Linear,
            mag_filter: TextureFilter::Linear,
            mipmaps: true,
        }
    }
}

/// Layout of uploaded pixel bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 => 3,
            PixelFormat::Rgba8 => 4,
        }
    }
}

/// Buffers cleared by [`Device::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearMask {
    pub color: bool,
    pub depth: bool,
}

impl ClearMask {
    pub const COLOR_AND_DEPTH: ClearMask = ClearMask {
        color: true,
        depth: true,
    };
}

/// An OpenGL-shaped graphics context.
///
/// Methods follow GL call semantics: binding `None` unbinds, buffer uploads
/// target the currently bound array buffer, texture calls target the 2D
/// texture bound on the active unit. Allocation failures surface either as an
/// `Err` from `create_*` or through [`Device::get_error`].
pub trait Device {
    type Buffer: Copy + Debug + PartialEq;
    type VertexArray: Copy + Debug + PartialEq;
    type Shader: Copy + Debug + PartialEq;
    type Program: Copy + Debug + PartialEq;
    type Texture: Copy + Debug + PartialEq;
    type UniformLocation: Clone + Debug;

    fn create_buffer(&mut self) -> Result<Self::Buffer, String>;
    fn bind_array_buffer(&mut self, buffer: Option<Self::Buffer>);
    /// Uploads `data` once into the bound array buffer with static usage.
    fn buffer_data_static(&mut self, data: &[f32]);
    fn delete_buffer(&mut self, buffer: Self::Buffer);

    fn create_vertex_array(&mut self) -> Result<Self::VertexArray, String>;
    fn bind_vertex_array(&mut self, vertex_array: Option<Self::VertexArray>);
    /// Records a float attribute sourced from the bound array buffer.
    fn vertex_attrib_pointer_f32(&mut self, attribute: &VertexAttribute);
    fn enable_vertex_attrib_array(&mut self, index: u32);
    fn delete_vertex_array(&mut self, vertex_array: Self::VertexArray);

    fn create_shader(&mut self, stage: ShaderStage) -> Result<Self::Shader, String>;
    fn shader_source(&mut self, shader: Self::Shader, source: &str);
    fn compile_shader(&mut self, shader: Self::Shader);
    fn get_shader_compile_status(&mut self, shader: Self::Shader) -> bool;
    fn get_shader_info_log(&mut self, shader: Self::Shader) -> String;
    fn delete_shader(&mut self, shader: Self::Shader);

    fn create_program(&mut self) -> Result<Self::Program, String>;
    fn attach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn detach_shader(&mut self, program: Self::Program, shader: Self::Shader);
    fn link_program(&mut self, program: Self::Program);
    fn get_program_link_status(&mut self, program: Self::Program) -> bool;
    fn get_program_info_log(&mut self, program: Self::Program) -> String;
    fn use_program(&mut self, program: Option<Self::Program>);
    fn delete_program(&mut self, program: Self::Program);
    fn get_uniform_location(
        &mut self,
        program: Self::Program,
        name: &str,
    ) -> Option<Self::UniformLocation>;
    /// Uploads a column-major 4x4 matrix to the bound program.
    fn uniform_matrix_4_f32(&mut self, location: &Self::UniformLocation, value: &[f32; 16]);
    fn uniform_3_f32(&mut self, location: &Self::UniformLocation, value: [f32; 3]);
    fn uniform_1_i32(&mut self, location: &Self::UniformLocation, value: i32);

    fn create_texture(&mut self) -> Result<Self::Texture, String>;
    fn active_texture(&mut self, unit: u32);
    fn bind_texture_2d(&mut self, texture: Option<Self::Texture>);
    fn tex_parameters(&mut self, sampler: &SamplerConfig);
    fn tex_image_2d(&mut self, width: u32, height: u32, format: PixelFormat, pixels: &[u8]);
    fn generate_mipmap_2d(&mut self);
    fn delete_texture(&mut self, texture: Self::Texture);

    fn clear_color(&mut self, rgba: [f32; 4]);
    fn enable_depth_test(&mut self, func: DepthFunc);
    fn enable_back_face_culling(&mut self);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn clear(&mut self, mask: ClearMask);
    fn draw_arrays(&mut self, mode: PrimitiveKind, first: i32, count: i32);

    /// Pops the oldest pending error code, GL `glGetError` style.
    fn get_error(&mut self) -> Option<u32>;

    /// Presents the finished frame. May block for vertical sync.
    fn present(&mut self);

    /// Called when the window surface changes size. Backends whose default
    /// framebuffer is owned by the window system need not react.
    fn surface_resized(&mut self, width: u32, height: u32) {
        let _ = (width, height);
    }
}

/// Drains the device error queue and converts the first pending error into a
/// [`RenderError::ResourceCreation`] for `resource`.
pub fn check_error<D: Device + ?Sized>(device: &mut D, resource: &str) -> Result<(), RenderError> {
    let mut first = None;
    while let Some(code) = device.get_error() {
        first.get_or_insert(code);
    }
    match first {
        Some(code) => Err(RenderError::resource(
            resource,
            format!("{} (0x{code:04X})", error_name(code)),
        )),
        None => Ok(()),
    }
}
