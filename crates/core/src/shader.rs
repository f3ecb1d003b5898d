//! Shader compilation, linking, and uniform lookup.
//!
//! [`ShaderProgram::compile`] compiles both stages independently, links them,
//! and releases the intermediate stage objects immediately. Compile and link
//! failures abort construction and carry the driver log; a half-linked
//! program is never returned.

use std::collections::HashMap;

use glam::{Mat4, Vec3};

use crate::device::{Device, ShaderStage};
use crate::error::RenderError;
use crate::glsl::{self, ShaderInterface};

/// Formats a shader compilation error for human-readable debugging.
///
/// Prepends right-aligned line numbers to each line of `source`, then
/// appends the driver's error `log`. This makes it easy to correlate
/// error messages (which reference line numbers) with the actual GLSL.
pub fn format_shader_error(source: &str, log: &str) -> String {
    let source_lines: Vec<&str> = source.lines().collect();
    let width = source_lines.len().max(1).to_string().len();

    let numbered = source_lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");

    match (numbered.is_empty(), log.is_empty()) {
        (true, true) => String::new(),
        (true, false) => log.to_string(),
        (false, true) => numbered,
        (false, false) => format!("{numbered}\n\n{log}"),
    }
}

/// Compiles a single shader stage.
///
/// On failure the stage object is deleted and the error carries the numbered
/// source followed by the driver's info log.
pub fn compile_shader<D: Device>(
    device: &mut D,
    stage: ShaderStage,
    source: &str,
) -> Result<D::Shader, RenderError> {
    let shader = device
        .create_shader(stage)
        .map_err(|e| RenderError::resource(&format!("{} shader", stage.name()), e))?;

    device.shader_source(shader, source);
    device.compile_shader(shader);

    if device.get_shader_compile_status(shader) {
        return Ok(shader);
    }

    let mut info_log = device.get_shader_info_log(shader);
    device.delete_shader(shader);
    if info_log.trim().is_empty() {
        info_log = "compilation failed without a driver message".into();
    }
    log::error!("{} shader failed to compile:\n{info_log}", stage.name());
    Err(RenderError::ShaderCompile {
        stage: stage.name().to_string(),
        log: format_shader_error(source, &info_log),
    })
}

/// Links a vertex and fragment shader into a program.
///
/// Detaches both stages afterward regardless of the outcome; the caller still
/// owns and must delete them.
pub fn link_program<D: Device>(
    device: &mut D,
    vertex: D::Shader,
    fragment: D::Shader,
) -> Result<D::Program, RenderError> {
    let program = device
        .create_program()
        .map_err(|e| RenderError::resource("shader program", e))?;

    device.attach_shader(program, vertex);
    device.attach_shader(program, fragment);
    device.link_program(program);
    device.detach_shader(program, vertex);
    device.detach_shader(program, fragment);

    if device.get_program_link_status(program) {
        return Ok(program);
    }

    let mut info_log = device.get_program_info_log(program);
    device.delete_program(program);
    if info_log.trim().is_empty() {
        info_log = "link failed without a driver message".into();
    }
    log::error!("shader program failed to link:\n{info_log}");
    Err(RenderError::ShaderLink(info_log))
}

/// A linked shader program with its cached uniform locations.
///
/// Uniform locations are stable for the program's lifetime, so they are
/// queried once and reused every frame. A name the program does not expose
/// resolves to `None`; callers treat such uniforms as optional.
pub struct ShaderProgram<D: Device> {
    program: Option<D::Program>,
    uniforms: HashMap<String, Option<D::UniformLocation>>,
    vertex_interface: Option<ShaderInterface>,
}

impl<D: Device> ShaderProgram<D> {
    /// Compiles `vertex_src` and `fragment_src` and links them.
    ///
    /// Uniforms declared by either stage are looked up right away. Both stage
    /// objects are deleted before this returns, on success and on failure.
    pub fn compile(device: &mut D, vertex_src: &str, fragment_src: &str) -> Result<Self, RenderError> {
        let vertex = compile_shader(device, ShaderStage::Vertex, vertex_src)?;
        let fragment = match compile_shader(device, ShaderStage::Fragment, fragment_src) {
            Ok(f) => f,
            Err(e) => {
                device.delete_shader(vertex);
                return Err(e);
            }
        };

        let linked = link_program(device, vertex, fragment);
        device.delete_shader(vertex);
        device.delete_shader(fragment);
        let program = linked?;

        let vertex_interface = glsl::scan(vertex_src).ok();
        let fragment_interface = glsl::scan(fragment_src).ok();

        let mut shader = Self {
            program: Some(program),
            uniforms: HashMap::new(),
            vertex_interface,
        };

        let declared: Vec<String> = shader
            .vertex_interface
            .iter()
            .chain(fragment_interface.iter())
            .flat_map(|iface| iface.uniforms.iter().map(|u| u.name.clone()))
            .collect();
        for name in &declared {
            shader.query_uniform(device, name);
        }

        log::debug!(
            "linked shader program {program:?} with {} uniform(s)",
            shader.uniforms.len()
        );
        Ok(shader)
    }

    /// Looks up and caches each of `names` that is not cached yet.
    pub fn cache_uniforms(&mut self, device: &mut D, names: &[&str]) {
        for name in names {
            if !self.uniforms.contains_key(*name) {
                self.query_uniform(device, name);
            }
        }
    }

    fn query_uniform(&mut self, device: &mut D, name: &str) {
        let location = self
            .program
            .and_then(|program| device.get_uniform_location(program, name));
        if location.is_none() {
            log::warn!("uniform '{name}' is not active in the program");
        }
        self.uniforms.insert(name.to_string(), location);
    }

    /// The cached location of `name`, or `None` if the program does not
    /// expose it or it was never cached.
    pub fn uniform_location(&self, name: &str) -> Option<&D::UniformLocation> {
        self.uniforms.get(name).and_then(Option::as_ref)
    }

    /// The scanned interface of the vertex stage, when the scanner understood it.
    pub fn vertex_interface(&self) -> Option<&ShaderInterface> {
        self.vertex_interface.as_ref()
    }

    /// The underlying program handle, `None` once released.
    pub fn handle(&self) -> Option<D::Program> {
        self.program
    }

    /// Binds the program for subsequent draw calls.
    pub fn use_program(&self, device: &mut D) {
        if let Some(program) = self.program {
            device.use_program(Some(program));
        }
    }

    /// Unbinds whatever program is current.
    pub fn unuse(&self, device: &mut D) {
        device.use_program(None);
    }

    /// Uploads `value` to `name` if the program exposes it. The program must be bound.
    pub fn set_mat4(&self, device: &mut D, name: &str, value: &Mat4) {
        if let Some(location) = self.uniform_location(name) {
            device.uniform_matrix_4_f32(location, &value.to_cols_array());
        }
    }

    pub fn set_vec3(&self, device: &mut D, name: &str, value: Vec3) {
        if let Some(location) = self.uniform_location(name) {
            device.uniform_3_f32(location, value.to_array());
        }
    }

    /// Uploads `value` to `name` if the program exposes it. The program must be bound.
    pub fn set_i32(&self, device: &mut D, name: &str, value: i32) {
        if let Some(location) = self.uniform_location(name) {
            device.uniform_1_i32(location, value);
        }
    }

    /// Unbinds and deletes the program. Further calls are no-ops.
    pub fn release(&mut self, device: &mut D) {
        match self.program.take() {
            Some(program) => {
                device.use_program(None);
                device.delete_program(program);
                self.uniforms.clear();
                log::debug!("released shader program {program:?}");
            }
            None => log::trace!("shader program already released"),
        }
    }

    pub fn is_released(&self) -> bool {
        self.program.is_none()
    }
}

impl<D: Device> Drop for ShaderProgram<D> {
    fn drop(&mut self) {
        if let Some(program) = self.program {
            log::warn!("shader program {program:?} dropped without release");
        }
    }
}
