//! Deterministic CPU implementation of [`Device`].
//!
//! `SoftwareDevice` keeps GL-style object tables and pipeline state, validates
//! shaders with the [`glsl`](crate::glsl) interface scanner, emulates the GL
//! error queue, and rasterizes triangles into an RGBA8 color buffer with an
//! `f32` depth buffer. It exists so the resource lifecycle and the transform
//! pipeline can be exercised and inspected without a GPU.
//!
//! Shader bodies are not executed. The pipeline is fixed-function:
//! - vertex: `clip = uProj * uView * uModel * vec4(location 0, 1)`, with any
//!   missing matrix treated as identity;
//! - fragment: the interpolated location-1 `vec3` color (white when absent),
//!   multiplied by the `uColor` uniform when set, and by the texture on the
//!   unit named by the program's `sampler2D` uniform sampled at the
//!   interpolated location-2 `vec2` coordinate.
//!
//! The framebuffer origin is the bottom-left corner, as in GL.

use std::collections::{HashMap, VecDeque};

use glam::{Mat4, Vec2, Vec3, Vec4};

use super::{
    ClearMask, DepthFunc, Device, PixelFormat, PrimitiveKind, SamplerConfig, ShaderStage,
    TextureFilter, TextureWrap, INVALID_OPERATION, INVALID_VALUE, OUT_OF_MEMORY,
};
use crate::glsl::{self, GlslType, ShaderInterface};
use crate::vertex::{VertexAttribute, COLOR_LOCATION, FLOAT_SIZE, POSITION_LOCATION, TEX_COORD_LOCATION};

/// Counts of objects that have been created and not yet deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveObjects {
    pub buffers: usize,
    pub vertex_arrays: usize,
    pub shaders: usize,
    pub programs: usize,
    pub textures: usize,
}

impl LiveObjects {
    pub fn total(&self) -> usize {
        self.buffers + self.vertex_arrays + self.shaders + self.programs + self.textures
    }
}

/// Snapshot of a texture object for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub sampler: SamplerConfig,
}

struct ShaderObject {
    stage: ShaderStage,
    source: String,
    compiled: bool,
    log: String,
    interface: Option<ShaderInterface>,
}

#[derive(Debug, Clone, Copy)]
enum UniformValue {
    Mat4([f32; 16]),
    Vec3([f32; 3]),
    Int(i32),
}

#[derive(Default)]
struct ProgramObject {
    attached: Vec<u32>,
    linked: bool,
    log: String,
    uniforms: Vec<(String, GlslType)>,
    values: HashMap<i32, UniformValue>,
}

#[derive(Clone, Copy)]
struct AttribBinding {
    attribute: VertexAttribute,
    buffer: u32,
    enabled: bool,
}

#[derive(Default)]
struct VertexArrayObject {
    bindings: HashMap<u32, AttribBinding>,
}

struct TextureObject {
    width: u32,
    height: u32,
    /// Row 0 is the first uploaded row, which maps to texture coordinate v = 0.
    texels: Vec<[u8; 4]>,
    sampler: SamplerConfig,
    mip_levels: u32,
}

/// Post-transform vertex ready for rasterization.
#[derive(Clone, Copy)]
struct ShadedVertex {
    window: Vec3,
    inv_w: f32,
    color: Vec3,
    uv: Vec2,
}

/// A CPU stand-in for an OpenGL context. See the module docs.
pub struct SoftwareDevice {
    next_name: u32,
    buffers: HashMap<u32, Vec<f32>>,
    vertex_arrays: HashMap<u32, VertexArrayObject>,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    textures: HashMap<u32, TextureObject>,

    errors: VecDeque<u32>,
    refuse_creation: bool,
    out_of_memory: bool,

    bound_buffer: Option<u32>,
    bound_vertex_array: Option<u32>,
    current_program: Option<u32>,
    active_unit: u32,
    texture_units: HashMap<u32, u32>,

    clear_color: [f32; 4],
    depth_func: Option<DepthFunc>,
    cull_back: bool,
    viewport: [i32; 4],

    width: u32,
    height: u32,
    color: Vec<[u8; 4]>,
    depth: Vec<f32>,
    front: Vec<[u8; 4]>,

    draw_calls: u64,
    frames_presented: u64,
}

impl SoftwareDevice {
    /// Creates a device whose default framebuffer is `width` x `height`.
    ///
    /// The viewport starts at the full surface, as a fresh GL context does.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            next_name: 1,
            buffers: HashMap::new(),
            vertex_arrays: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            errors: VecDeque::new(),
            refuse_creation: false,
            out_of_memory: false,
            bound_buffer: None,
            bound_vertex_array: None,
            current_program: None,
            active_unit: 0,
            texture_units: HashMap::new(),
            clear_color: [0.0, 0.0, 0.0, 0.0],
            depth_func: None,
            cull_back: false,
            viewport: [0, 0, width as i32, height as i32],
            width,
            height,
            color: vec![[0, 0, 0, 0]; len],
            depth: vec![1.0; len],
            front: vec![[0, 0, 0, 0]; len],
            draw_calls: 0,
            frames_presented: 0,
        }
    }

    /// Reallocates the default framebuffer, as a window resize does.
    ///
    /// Contents are discarded; the viewport is left for the caller to update.
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        let len = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.color = vec![[0, 0, 0, 0]; len];
        self.depth = vec![1.0; len];
        self.front = vec![[0, 0, 0, 0]; len];
    }

    /// Makes every `create_*` call fail, as a driver that refuses allocation.
    pub fn refuse_object_creation(&mut self, refuse: bool) {
        self.refuse_creation = refuse;
    }

    /// Makes buffer and texture uploads raise `GL_OUT_OF_MEMORY`.
    pub fn simulate_out_of_memory(&mut self, enabled: bool) {
        self.out_of_memory = enabled;
    }

    /// Queues an error code as if a previous call had raised it.
    pub fn push_error(&mut self, code: u32) {
        self.errors.push_back(code);
    }

    pub fn live_objects(&self) -> LiveObjects {
        LiveObjects {
            buffers: self.buffers.len(),
            vertex_arrays: self.vertex_arrays.len(),
            shaders: self.shaders.len(),
            programs: self.programs.len(),
            textures: self.textures.len(),
        }
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn viewport_rect(&self) -> [i32; 4] {
        self.viewport
    }

    pub fn clear_color_value(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn depth_test(&self) -> Option<DepthFunc> {
        self.depth_func
    }

    pub fn culls_back_faces(&self) -> bool {
        self.cull_back
    }

    pub fn current_program(&self) -> Option<u32> {
        self.current_program
    }

    pub fn bound_vertex_array(&self) -> Option<u32> {
        self.bound_vertex_array
    }

    pub fn bound_array_buffer(&self) -> Option<u32> {
        self.bound_buffer
    }

    pub fn texture_on_unit(&self, unit: u32) -> Option<u32> {
        self.texture_units.get(&unit).copied()
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Contents of a buffer object.
    pub fn buffer_contents(&self, buffer: u32) -> Option<&[f32]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// The last matrix uploaded to `name` in `program`.
    pub fn uniform_mat4(&self, program: u32, name: &str) -> Option<Mat4> {
        let program = self.programs.get(&program)?;
        let location = program.uniforms.iter().position(|(n, _)| n == name)? as i32;
        match program.values.get(&location)? {
            UniformValue::Mat4(m) => Some(Mat4::from_cols_array(m)),
            _ => None,
        }
    }

    /// The last integer uploaded to `name` in `program`.
    pub fn uniform_i32(&self, program: u32, name: &str) -> Option<i32> {
        let program = self.programs.get(&program)?;
        let location = program.uniforms.iter().position(|(n, _)| n == name)? as i32;
        match program.values.get(&location)? {
            UniformValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn texture_info(&self, texture: u32) -> Option<TextureInfo> {
        self.textures.get(&texture).map(|t| TextureInfo {
            width: t.width,
            height: t.height,
            mip_levels: t.mip_levels,
            sampler: t.sampler,
        })
    }

    /// Texel at `(x, y)` where `y = 0` is the first uploaded row.
    pub fn texel(&self, texture: u32, x: u32, y: u32) -> Option<[u8; 4]> {
        let t = self.textures.get(&texture)?;
        if x >= t.width || y >= t.height {
            return None;
        }
        Some(t.texels[(y * t.width + x) as usize])
    }

    /// Back-buffer pixel at `(x, y)` with the origin at the bottom-left.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.color[(y * self.width + x) as usize])
    }

    /// Number of back-buffer pixels that differ from `background`.
    pub fn covered_pixels(&self, background: [u8; 4]) -> usize {
        self.color.iter().filter(|&&p| p != background).count()
    }

    /// The last presented frame as tightly packed RGBA8, top row first.
    pub fn front_buffer_rgba(&self) -> Vec<u8> {
        let row = self.width as usize;
        self.front
            .chunks(row.max(1))
            .rev()
            .flat_map(|r| r.iter().flatten().copied())
            .collect()
    }

    fn gen_name(&mut self) -> Result<u32, String> {
        if self.refuse_creation {
            return Err("driver refused object creation".into());
        }
        let name = self.next_name;
        self.next_name += 1;
        Ok(name)
    }

    fn error(&mut self, code: u32) {
        log::trace!("software device raised 0x{code:04X}");
        self.errors.push_back(code);
    }

    fn attached_interface(
        &self,
        attached: &[u32],
        stage: ShaderStage,
    ) -> Result<&ShaderInterface, String> {
        let mut found = attached
            .iter()
            .filter_map(|s| self.shaders.get(s))
            .filter(|s| s.stage == stage);
        let shader = found
            .next()
            .ok_or_else(|| format!("error: no {} shader attached", stage.name()))?;
        if found.next().is_some() {
            return Err(format!(
                "error: more than one {} shader attached",
                stage.name()
            ));
        }
        shader
            .interface
            .as_ref()
            .filter(|_| shader.compiled)
            .ok_or_else(|| format!("error: {} shader is not compiled", stage.name()))
    }

    fn fetch(&self, vao: &VertexArrayObject, location: u32, vertex: usize) -> Option<Vec4> {
        let binding = vao.bindings.get(&location).filter(|b| b.enabled)?;
        let data = self.buffers.get(&binding.buffer)?;
        let attr = binding.attribute;
        let start = (attr.offset_bytes + vertex * attr.stride_bytes) / FLOAT_SIZE;
        let slice = data.get(start..start + attr.components as usize)?;
        let mut v = Vec4::new(0.0, 0.0, 0.0, 1.0);
        for (i, &c) in slice.iter().enumerate() {
            v[i] = c;
        }
        Some(v)
    }

    fn shade_vertex(
        &self,
        vao: &VertexArrayObject,
        mvp: &Mat4,
        vertex: usize,
    ) -> Result<Option<ShadedVertex>, u32> {
        let position = self
            .fetch(vao, POSITION_LOCATION, vertex)
            .ok_or(INVALID_OPERATION)?;
        let clip = *mvp * position.truncate().extend(1.0);
        if clip.w <= f32::EPSILON {
            return Ok(None);
        }
        let inv_w = 1.0 / clip.w;
        let ndc = clip.truncate() * inv_w;
        let [vx, vy, vw, vh] = self.viewport;
        let window = Vec3::new(
            vx as f32 + (ndc.x + 1.0) * 0.5 * vw as f32,
            vy as f32 + (ndc.y + 1.0) * 0.5 * vh as f32,
            (ndc.z + 1.0) * 0.5,
        );
        let color = self
            .fetch(vao, COLOR_LOCATION, vertex)
            .map(|c| c.truncate())
            .unwrap_or(Vec3::ONE);
        let uv = self
            .fetch(vao, TEX_COORD_LOCATION, vertex)
            .map(|t| Vec2::new(t.x, t.y))
            .unwrap_or(Vec2::ZERO);
        Ok(Some(ShadedVertex {
            window,
            inv_w,
            color,
            uv,
        }))
    }

    fn rasterize(&mut self, tri: [ShadedVertex; 3], tint: Vec3, texture: Option<u32>) {
        let [a, b, c] = tri;
        let edge = |p: Vec2, q: Vec2, r: Vec2| (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        let (pa, pb, pc) = (a.window.truncate(), b.window.truncate(), c.window.truncate());
        let area = edge(pa, pb, pc);
        if area.abs() <= f32::EPSILON {
            return;
        }
        // Counter-clockwise in window space is front-facing.
        if self.cull_back && area < 0.0 {
            return;
        }

        let [vx, vy, vw, vh] = self.viewport;
        let x_lo = vx.max(0);
        let y_lo = vy.max(0);
        let x_hi = (vx + vw).min(self.width as i32);
        let y_hi = (vy + vh).min(self.height as i32);

        let min_x = (pa.x.min(pb.x).min(pc.x).floor() as i32).max(x_lo);
        let max_x = (pa.x.max(pb.x).max(pc.x).ceil() as i32).min(x_hi);
        let min_y = (pa.y.min(pb.y).min(pc.y).floor() as i32).max(y_lo);
        let max_y = (pa.y.max(pb.y).max(pc.y).ceil() as i32).min(y_hi);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                let w0 = edge(pb, pc, p) / area;
                let w1 = edge(pc, pa, p) / area;
                let w2 = edge(pa, pb, p) / area;
                if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                    continue;
                }

                let z = w0 * a.window.z + w1 * b.window.z + w2 * c.window.z;
                let idx = (y as u32 * self.width + x as u32) as usize;
                if let Some(func) = self.depth_func {
                    let stored = self.depth[idx];
                    let pass = match func {
                        DepthFunc::Less => z < stored,
                        DepthFunc::LessEqual => z <= stored,
                        DepthFunc::Always => true,
                    };
                    if !pass {
                        continue;
                    }
                    self.depth[idx] = z;
                }

                // Perspective-correct varyings.
                let (p0, p1, p2) = (w0 * a.inv_w, w1 * b.inv_w, w2 * c.inv_w);
                let norm = 1.0 / (p0 + p1 + p2);
                let color = (a.color * p0 + b.color * p1 + c.color * p2) * norm;
                let uv = (a.uv * p0 + b.uv * p1 + c.uv * p2) * norm;

                let mut rgba = (color * tint).extend(1.0);
                if let Some(tex) = texture.and_then(|t| self.textures.get(&t)) {
                    rgba *= sample(tex, uv);
                }
                self.color[idx] = to_rgba8(rgba);
            }
        }
    }
}

fn to_rgba8(c: Vec4) -> [u8; 4] {
    let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(c.x), q(c.y), q(c.z), q(c.w)]
}

fn wrap_coord(t: f32, mode: TextureWrap) -> f32 {
    match mode {
        TextureWrap::Repeat => t - t.floor(),
        TextureWrap::ClampToEdge => t.clamp(0.0, 1.0),
        TextureWrap::MirroredRepeat => {
            let period = t.rem_euclid(2.0);
            if period > 1.0 {
                2.0 - period
            } else {
                period
            }
        }
    }
}

fn sample(tex: &TextureObject, uv: Vec2) -> Vec4 {
    if tex.width == 0 || tex.height == 0 {
        return Vec4::ONE;
    }
    let u = wrap_coord(uv.x, tex.sampler.wrap_s) * tex.width as f32 - 0.5;
    let v = wrap_coord(uv.y, tex.sampler.wrap_t) * tex.height as f32 - 0.5;
    let texel = |x: i32, y: i32| {
        let x = x.clamp(0, tex.width as i32 - 1) as u32;
        let y = y.clamp(0, tex.height as i32 - 1) as u32;
        let [r, g, b, a] = tex.texels[(y * tex.width + x) as usize];
        Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
    };
    match tex.sampler.mag_filter {
        TextureFilter::Nearest => texel(u.round() as i32, v.round() as i32),
        TextureFilter::Linear => {
            let (x0, y0) = (u.floor(), v.floor());
            let (fx, fy) = (u - x0, v - y0);
            let (x0, y0) = (x0 as i32, y0 as i32);
            let top = texel(x0, y0).lerp(texel(x0 + 1, y0), fx);
            let bottom = texel(x0, y0 + 1).lerp(texel(x0 + 1, y0 + 1), fx);
            top.lerp(bottom, fy)
        }
    }
}

impl Device for SoftwareDevice {
    type Buffer = u32;
    type VertexArray = u32;
    type Shader = u32;
    type Program = u32;
    type Texture = u32;
    type UniformLocation = i32;

    fn create_buffer(&mut self) -> Result<u32, String> {
        let name = self.gen_name()?;
        self.buffers.insert(name, Vec::new());
        Ok(name)
    }

    fn bind_array_buffer(&mut self, buffer: Option<u32>) {
        match buffer {
            Some(b) if !self.buffers.contains_key(&b) => self.error(INVALID_OPERATION),
            _ => self.bound_buffer = buffer,
        }
    }

    fn buffer_data_static(&mut self, data: &[f32]) {
        let Some(bound) = self.bound_buffer else {
            self.error(INVALID_OPERATION);
            return;
        };
        if self.out_of_memory {
            self.error(OUT_OF_MEMORY);
            return;
        }
        if let Some(storage) = self.buffers.get_mut(&bound) {
            storage.clear();
            storage.extend_from_slice(data);
        }
    }

    fn delete_buffer(&mut self, buffer: u32) {
        if self.buffers.remove(&buffer).is_some() && self.bound_buffer == Some(buffer) {
            self.bound_buffer = None;
        }
    }

    fn create_vertex_array(&mut self) -> Result<u32, String> {
        let name = self.gen_name()?;
        self.vertex_arrays.insert(name, VertexArrayObject::default());
        Ok(name)
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<u32>) {
        match vertex_array {
            Some(v) if !self.vertex_arrays.contains_key(&v) => self.error(INVALID_OPERATION),
            _ => self.bound_vertex_array = vertex_array,
        }
    }

    fn vertex_attrib_pointer_f32(&mut self, attribute: &VertexAttribute) {
        let (Some(vao), Some(buffer)) = (self.bound_vertex_array, self.bound_buffer) else {
            self.error(INVALID_OPERATION);
            return;
        };
        if let Some(vao) = self.vertex_arrays.get_mut(&vao) {
            let enabled = vao
                .bindings
                .get(&attribute.index)
                .is_some_and(|b| b.enabled);
            vao.bindings.insert(
                attribute.index,
                AttribBinding {
                    attribute: *attribute,
                    buffer,
                    enabled,
                },
            );
        }
    }

    fn enable_vertex_attrib_array(&mut self, index: u32) {
        let Some(vao) = self.bound_vertex_array else {
            self.error(INVALID_OPERATION);
            return;
        };
        match self
            .vertex_arrays
            .get_mut(&vao)
            .and_then(|v| v.bindings.get_mut(&index))
        {
            Some(binding) => binding.enabled = true,
            None => self.error(INVALID_VALUE),
        }
    }

    fn delete_vertex_array(&mut self, vertex_array: u32) {
        if self.vertex_arrays.remove(&vertex_array).is_some()
            && self.bound_vertex_array == Some(vertex_array)
        {
            self.bound_vertex_array = None;
        }
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32, String> {
        let name = self.gen_name()?;
        self.shaders.insert(
            name,
            ShaderObject {
                stage,
                source: String::new(),
                compiled: false,
                log: String::new(),
                interface: None,
            },
        );
        Ok(name)
    }

    fn shader_source(&mut self, shader: u32, source: &str) {
        match self.shaders.get_mut(&shader) {
            Some(s) => s.source = source.to_string(),
            None => self.error(INVALID_VALUE),
        }
    }

    fn compile_shader(&mut self, shader: u32) {
        let Some(s) = self.shaders.get_mut(&shader) else {
            self.error(INVALID_VALUE);
            return;
        };
        match glsl::scan(&s.source) {
            Ok(interface) => {
                s.compiled = true;
                s.log.clear();
                s.interface = Some(interface);
            }
            Err(diagnostics) => {
                s.compiled = false;
                s.log = glsl::diagnostics_log(&diagnostics);
                s.interface = None;
            }
        }
    }

    fn get_shader_compile_status(&mut self, shader: u32) -> bool {
        self.shaders.get(&shader).is_some_and(|s| s.compiled)
    }

    fn get_shader_info_log(&mut self, shader: u32) -> String {
        self.shaders
            .get(&shader)
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_shader(&mut self, shader: u32) {
        self.shaders.remove(&shader);
    }

    fn create_program(&mut self) -> Result<u32, String> {
        let name = self.gen_name()?;
        self.programs.insert(name, ProgramObject::default());
        Ok(name)
    }

    fn attach_shader(&mut self, program: u32, shader: u32) {
        if !self.shaders.contains_key(&shader) {
            self.error(INVALID_VALUE);
            return;
        }
        match self.programs.get_mut(&program) {
            Some(p) if !p.attached.contains(&shader) => p.attached.push(shader),
            Some(_) => self.error(INVALID_OPERATION),
            None => self.error(INVALID_VALUE),
        }
    }

    fn detach_shader(&mut self, program: u32, shader: u32) {
        match self.programs.get_mut(&program) {
            Some(p) if p.attached.contains(&shader) => p.attached.retain(|&s| s != shader),
            Some(_) => self.error(INVALID_OPERATION),
            None => self.error(INVALID_VALUE),
        }
    }

    fn link_program(&mut self, program: u32) {
        let Some(attached) = self.programs.get(&program).map(|p| p.attached.clone()) else {
            self.error(INVALID_VALUE);
            return;
        };

        let result = self.attached_interface(&attached, ShaderStage::Vertex).and_then(|vertex| {
            let fragment = self.attached_interface(&attached, ShaderStage::Fragment)?;
            glsl::check_link(vertex, fragment)?;
            let mut uniforms: Vec<(String, GlslType)> = Vec::new();
            for decl in vertex.uniforms.iter().chain(&fragment.uniforms) {
                if !uniforms.iter().any(|(n, _)| *n == decl.name) {
                    uniforms.push((decl.name.clone(), decl.ty));
                }
            }
            Ok(uniforms)
        });

        if let Some(p) = self.programs.get_mut(&program) {
            p.values.clear();
            match result {
                Ok(uniforms) => {
                    p.linked = true;
                    p.log.clear();
                    p.uniforms = uniforms;
                }
                Err(log) => {
                    p.linked = false;
                    p.log = log;
                    p.uniforms.clear();
                }
            }
        }
    }

    fn get_program_link_status(&mut self, program: u32) -> bool {
        self.programs.get(&program).is_some_and(|p| p.linked)
    }

    fn get_program_info_log(&mut self, program: u32) -> String {
        self.programs
            .get(&program)
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn use_program(&mut self, program: Option<u32>) {
        match program {
            Some(p) if !self.programs.get(&p).is_some_and(|p| p.linked) => {
                self.error(INVALID_OPERATION)
            }
            _ => self.current_program = program,
        }
    }

    fn delete_program(&mut self, program: u32) {
        if self.programs.remove(&program).is_some() && self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn get_uniform_location(&mut self, program: u32, name: &str) -> Option<i32> {
        let p = self.programs.get(&program).filter(|p| p.linked)?;
        p.uniforms
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| i as i32)
    }

    fn uniform_matrix_4_f32(&mut self, location: &i32, value: &[f32; 16]) {
        let Some(p) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            self.error(INVALID_OPERATION);
            return;
        };
        match p.uniforms.get(*location as usize) {
            Some((_, GlslType::Mat4)) if *location >= 0 => {
                p.values.insert(*location, UniformValue::Mat4(*value));
            }
            _ => self.error(INVALID_OPERATION),
        }
    }

    fn uniform_3_f32(&mut self, location: &i32, value: [f32; 3]) {
        let Some(p) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            self.error(INVALID_OPERATION);
            return;
        };
        match p.uniforms.get(*location as usize) {
            Some((_, GlslType::Vec3)) if *location >= 0 => {
                p.values.insert(*location, UniformValue::Vec3(value));
            }
            _ => self.error(INVALID_OPERATION),
        }
    }

    fn uniform_1_i32(&mut self, location: &i32, value: i32) {
        let Some(p) = self.current_program.and_then(|p| self.programs.get_mut(&p)) else {
            self.error(INVALID_OPERATION);
            return;
        };
        match p.uniforms.get(*location as usize) {
            Some((_, GlslType::Int | GlslType::Sampler2D)) if *location >= 0 => {
                p.values.insert(*location, UniformValue::Int(value));
            }
            _ => self.error(INVALID_OPERATION),
        }
    }

    fn create_texture(&mut self) -> Result<u32, String> {
        let name = self.gen_name()?;
        self.textures.insert(
            name,
            TextureObject {
                width: 0,
                height: 0,
                texels: Vec::new(),
                sampler: SamplerConfig::default(),
                mip_levels: 1,
            },
        );
        Ok(name)
    }

    fn active_texture(&mut self, unit: u32) {
        self.active_unit = unit;
    }

    fn bind_texture_2d(&mut self, texture: Option<u32>) {
        match texture {
            Some(t) if !self.textures.contains_key(&t) => self.error(INVALID_OPERATION),
            Some(t) => {
                self.texture_units.insert(self.active_unit, t);
            }
            None => {
                self.texture_units.remove(&self.active_unit);
            }
        }
    }

    fn tex_parameters(&mut self, sampler: &SamplerConfig) {
        let bound = self.texture_units.get(&self.active_unit).copied();
        match bound.and_then(|t| self.textures.get_mut(&t)) {
            Some(t) => t.sampler = *sampler,
            None => self.error(INVALID_OPERATION),
        }
    }

    fn tex_image_2d(&mut self, width: u32, height: u32, format: PixelFormat, pixels: &[u8]) {
        let bound = self.texture_units.get(&self.active_unit).copied();
        let Some(texture) = bound else {
            self.error(INVALID_OPERATION);
            return;
        };
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            self.error(INVALID_VALUE);
            return;
        }
        if self.out_of_memory {
            self.error(OUT_OF_MEMORY);
            return;
        }
        let texels = pixels
            .chunks_exact(format.bytes_per_pixel())
            .map(|p| match format {
                PixelFormat::Rgb8 => [p[0], p[1], p[2], 255],
                PixelFormat::Rgba8 => [p[0], p[1], p[2], p[3]],
            })
            .collect();
        if let Some(t) = self.textures.get_mut(&texture) {
            t.width = width;
            t.height = height;
            t.texels = texels;
            t.mip_levels = 1;
        }
    }

    fn generate_mipmap_2d(&mut self) {
        let bound = self.texture_units.get(&self.active_unit).copied();
        match bound.and_then(|t| self.textures.get_mut(&t)) {
            Some(t) if t.width > 0 && t.height > 0 => {
                t.mip_levels = 32 - t.width.max(t.height).leading_zeros();
            }
            _ => self.error(INVALID_OPERATION),
        }
    }

    fn delete_texture(&mut self, texture: u32) {
        if self.textures.remove(&texture).is_some() {
            self.texture_units.retain(|_, t| *t != texture);
        }
    }

    fn clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
    }

    fn enable_depth_test(&mut self, func: DepthFunc) {
        self.depth_func = Some(func);
    }

    fn enable_back_face_culling(&mut self) {
        self.cull_back = true;
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        if width < 0 || height < 0 {
            self.error(INVALID_VALUE);
            return;
        }
        self.viewport = [x, y, width, height];
    }

    fn clear(&mut self, mask: ClearMask) {
        if mask.color {
            let c = to_rgba8(Vec4::from_array(self.clear_color));
            self.color.fill(c);
        }
        if mask.depth {
            self.depth.fill(1.0);
        }
    }

    fn draw_arrays(&mut self, mode: PrimitiveKind, first: i32, count: i32) {
        if first < 0 || count < 0 {
            self.error(INVALID_VALUE);
            return;
        }
        let Some(program) = self.current_program.and_then(|p| self.programs.get(&p)) else {
            self.error(INVALID_OPERATION);
            return;
        };
        let Some(vao) = self.bound_vertex_array.and_then(|v| self.vertex_arrays.get(&v)) else {
            self.error(INVALID_OPERATION);
            return;
        };

        let matrix = |name: &str| {
            program
                .uniforms
                .iter()
                .position(|(n, _)| n == name)
                .and_then(|i| program.values.get(&(i as i32)))
                .and_then(|v| match v {
                    UniformValue::Mat4(m) => Some(Mat4::from_cols_array(m)),
                    _ => None,
                })
                .unwrap_or(Mat4::IDENTITY)
        };
        let mvp = matrix("uProj") * matrix("uView") * matrix("uModel");
        let tint = program
            .uniforms
            .iter()
            .position(|(n, _)| n == "uColor")
            .and_then(|i| match program.values.get(&(i as i32)) {
                Some(UniformValue::Vec3(c)) => Some(Vec3::from_array(*c)),
                _ => None,
            })
            .unwrap_or(Vec3::ONE);

        let texture = program
            .uniforms
            .iter()
            .position(|(_, ty)| *ty == GlslType::Sampler2D)
            .map(|i| match program.values.get(&(i as i32)) {
                Some(UniformValue::Int(unit)) => *unit as u32,
                _ => 0,
            })
            .and_then(|unit| self.texture_units.get(&unit).copied());

        let first = first as usize;
        let shaded: Result<Vec<_>, u32> = (first..first + count as usize)
            .map(|vertex| self.shade_vertex(vao, &mvp, vertex))
            .collect();
        let shaded = match shaded {
            Ok(shaded) => shaded,
            Err(code) => {
                self.error(code);
                return;
            }
        };

        let triangles: Vec<[Option<ShadedVertex>; 3]> = match mode {
            PrimitiveKind::Triangles => shaded
                .chunks_exact(3)
                .map(|t| [t[0], t[1], t[2]])
                .collect(),
            PrimitiveKind::TriangleStrip => shaded
                .windows(3)
                .enumerate()
                .map(|(i, t)| {
                    if i.is_multiple_of(2) {
                        [t[0], t[1], t[2]]
                    } else {
                        [t[1], t[0], t[2]]
                    }
                })
                .collect(),
            PrimitiveKind::Lines | PrimitiveKind::Points => {
                log::trace!("software device does not rasterize {mode:?}");
                Vec::new()
            }
        };

        self.draw_calls += 1;
        for tri in triangles {
            // Triangles crossing the eye plane are dropped rather than clipped.
            if let [Some(a), Some(b), Some(c)] = tri {
                self.rasterize([a, b, c], tint, texture);
            }
        }
    }

    fn get_error(&mut self) -> Option<u32> {
        self.errors.pop_front()
    }

    fn present(&mut self) {
        self.front.clone_from(&self.color);
        self.frames_presented += 1;
    }

    fn surface_resized(&mut self, width: u32, height: u32) {
        self.resize_surface(width, height);
    }
}
