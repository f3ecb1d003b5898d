//! The per-scene state machine.
//!
//! ```text
//! Uninitialized --load--> Loaded --update--> Updating --render--> Rendering
//!                                               ^                    |
//!                                               +------update--------+
//! any state --unload--> Unloaded (terminal)
//! ```
//!
//! Resizes update the viewport in any live state without a transition.

use std::fmt;

use crate::animation::AnimationState;
use crate::device::{ClearMask, DepthFunc, Device, PrimitiveKind, SamplerConfig};
use crate::error::RenderError;
use crate::geometry::GeometryBuffer;
use crate::host::{FrameHandler, LoopControl};
use crate::scene::{SceneConfig, TRIANGLE_COLOR};
use crate::shader::ShaderProgram;
use crate::texture::{PixelData, TextureResource};
use crate::transform::{aspect_ratio, FrameTransforms, TransformPipeline};
use crate::vertex::{pack_vertices, VertexLayout};

/// Uniforms written every frame.
pub const MODEL_UNIFORM: &str = "uModel";
pub const VIEW_UNIFORM: &str = "uView";
pub const PROJECTION_UNIFORM: &str = "uProj";
pub const COLOR_UNIFORM: &str = "uColor";
pub const TEXTURE_UNIFORM: &str = "uTexture";

/// Texture unit the scene texture is bound to.
pub const TEXTURE_UNIT: u32 = 0;

/// Side length of the generated fallback texture.
const CHECKERBOARD_SIZE: u32 = 256;

/// Surface extent as GL's signed size, saturating at `i32::MAX`.
fn gl_extent(size: u32) -> i32 {
    i32::try_from(size).unwrap_or(i32::MAX)
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LoopState {
    Uninitialized,
    Loaded,
    Updating,
    Rendering,
    Unloaded,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopState::Uninitialized => "uninitialized",
            LoopState::Loaded => "loaded",
            LoopState::Updating => "updating",
            LoopState::Rendering => "rendering",
            LoopState::Unloaded => "unloaded",
        })
    }
}

/// Drives one scene on a device it owns.
///
/// GPU resources are acquired in `load` (program, then geometry, then
/// texture) and released in reverse by `unload`, which also runs on drop.
pub struct RenderLoop<D: Device> {
    device: D,
    config: SceneConfig,
    pipeline: TransformPipeline,
    texture_source: Option<PixelData>,
    state: LoopState,
    animation: AnimationState,
    viewport: (u32, u32),
    program: Option<ShaderProgram<D>>,
    geometry: Option<GeometryBuffer<D>>,
    texture: Option<TextureResource<D>>,
    frames: u64,
}

impl<D: Device> RenderLoop<D> {
    /// Creates an unloaded loop for `config` on `device`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidConfig`] if the config fails validation.
    pub fn new(device: D, config: SceneConfig) -> Result<Self, RenderError> {
        config.validate()?;
        Ok(Self {
            device,
            pipeline: config.pipeline(),
            viewport: (config.width, config.height),
            config,
            texture_source: None,
            state: LoopState::Uninitialized,
            animation: AnimationState::new(),
            program: None,
            geometry: None,
            texture: None,
            frames: 0,
        })
    }

    /// Supplies decoded pixels for a textured scene. Without them a
    /// checkerboard is generated at load.
    pub fn with_texture(mut self, pixels: PixelData) -> Self {
        self.texture_source = Some(pixels);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn animation_state(&self) -> &AnimationState {
        &self.animation
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn program(&self) -> Option<&ShaderProgram<D>> {
        self.program.as_ref()
    }

    pub fn geometry(&self) -> Option<&GeometryBuffer<D>> {
        self.geometry.as_ref()
    }

    pub fn texture(&self) -> Option<&TextureResource<D>> {
        self.texture.as_ref()
    }

    /// Matrices for the current animation state and viewport.
    pub fn transforms(&self) -> FrameTransforms {
        let (width, height) = self.viewport;
        self.pipeline
            .compute(&self.animation, aspect_ratio(width, height))
    }

    fn transition_error(&self, event: &str) -> RenderError {
        RenderError::InvalidTransition {
            state: self.state.to_string(),
            event: event.to_string(),
        }
    }

    /// Applies a new surface size to the device and the projection.
    pub fn resize(&mut self, width: u32, height: u32) {
        if self.state == LoopState::Unloaded {
            log::warn!("ignoring resize to {width}x{height} after unload");
            return;
        }
        if width == 0 || height == 0 {
            log::warn!("zero-sized viewport {width}x{height}");
        }
        self.viewport = (width, height);
        self.device.surface_resized(width, height);
        self.device.viewport(0, 0, gl_extent(width), gl_extent(height));
        log::info!("viewport resized to {width}x{height}");
    }

    /// Acquires every GPU resource and sets fixed pipeline state.
    ///
    /// On failure nothing stays allocated and the loop remains
    /// `Uninitialized`.
    pub fn load(&mut self) -> Result<(), RenderError> {
        if self.state != LoopState::Uninitialized {
            return Err(self.transition_error("load"));
        }
        let variant = self.config.variant;
        log::info!("loading scene '{variant}'");

        if let Err(e) = self.acquire() {
            self.release_resources();
            return Err(e);
        }

        self.device.clear_color(self.config.clear_color);
        self.device.enable_depth_test(DepthFunc::Less);
        self.device.enable_back_face_culling();
        let (width, height) = self.viewport;
        self.device.viewport(0, 0, gl_extent(width), gl_extent(height));

        self.state = LoopState::Loaded;
        Ok(())
    }

    fn acquire(&mut self) -> Result<(), RenderError> {
        let variant = self.config.variant;
        let (vertex_src, fragment_src) = variant.shader_sources();

        let program = self.program.insert(ShaderProgram::compile(
            &mut self.device,
            vertex_src,
            fragment_src,
        )?);
        let mut uniforms = vec![MODEL_UNIFORM, VIEW_UNIFORM, PROJECTION_UNIFORM];
        if variant.uses_flat_color() {
            uniforms.push(COLOR_UNIFORM);
        }
        if variant.uses_texture() {
            uniforms.push(TEXTURE_UNIFORM);
        }
        program.cache_uniforms(&mut self.device, &uniforms);

        let format = variant.vertex_format();
        let layout = VertexLayout::for_format(format);
        if let Some(interface) = program.vertex_interface() {
            interface.check_vertex_layout(&layout)?;
        }

        let vertices = pack_vertices(&variant.vertices(), format)?;
        self.geometry = Some(GeometryBuffer::build(&mut self.device, &vertices, layout)?);

        if variant.uses_texture() {
            let pixels = self.texture_source.take().unwrap_or_else(|| {
                log::info!("no texture supplied, generating checkerboard");
                PixelData::checkerboard(
                    CHECKERBOARD_SIZE,
                    8,
                    [235, 235, 235, 255],
                    [40, 90, 160, 255],
                )
            });
            self.texture = Some(TextureResource::upload(
                &mut self.device,
                pixels,
                SamplerConfig::default(),
            )?);
        }
        Ok(())
    }

    /// Advances animation by `dt` seconds.
    pub fn update(&mut self, dt: f64) -> Result<(), RenderError> {
        match self.state {
            LoopState::Loaded | LoopState::Updating | LoopState::Rendering => {
                self.animation.advance(dt, &self.pipeline.animation);
                self.state = LoopState::Updating;
                Ok(())
            }
            LoopState::Uninitialized | LoopState::Unloaded => Err(self.transition_error("update")),
        }
    }

    /// Draws and presents one frame. Must follow an `update`.
    ///
    /// Returns the matrices the frame was drawn with.
    pub fn render(&mut self) -> Result<FrameTransforms, RenderError> {
        if self.state != LoopState::Updating {
            return Err(self.transition_error("render"));
        }
        let transforms = self.transforms();
        let (Some(program), Some(geometry)) = (&self.program, &self.geometry) else {
            return Err(self.transition_error("render"));
        };
        let device = &mut self.device;

        device.clear(ClearMask::COLOR_AND_DEPTH);
        program.use_program(device);
        geometry.bind(device);
        if let Some(texture) = &self.texture {
            texture.bind(device, TEXTURE_UNIT);
            program.set_i32(device, TEXTURE_UNIFORM, TEXTURE_UNIT as i32);
        }

        program.set_mat4(device, MODEL_UNIFORM, &transforms.model);
        program.set_mat4(device, VIEW_UNIFORM, &transforms.view);
        program.set_mat4(device, PROJECTION_UNIFORM, &transforms.projection);
        program.set_vec3(device, COLOR_UNIFORM, TRIANGLE_COLOR);

        let drawn = geometry.draw_all(device, PrimitiveKind::Triangles);

        if let Some(texture) = &self.texture {
            texture.unbind(device, TEXTURE_UNIT);
        }
        geometry.unbind(device);
        program.unuse(device);
        drawn?;
        device.present();

        while let Some(code) = device.get_error() {
            log::warn!(
                "device reported {} (0x{code:04X}) during frame {}",
                crate::device::error_name(code),
                self.frames
            );
        }

        self.frames += 1;
        self.state = LoopState::Rendering;
        Ok(transforms)
    }

    /// Releases everything and enters the terminal state. Only the first
    /// call has an effect.
    pub fn unload(&mut self) {
        if self.state == LoopState::Unloaded {
            log::trace!("render loop already unloaded");
            return;
        }
        self.release_resources();
        self.state = LoopState::Unloaded;
        log::info!("unloaded scene after {} frame(s)", self.frames);
    }

    fn release_resources(&mut self) {
        if let Some(mut texture) = self.texture.take() {
            texture.release(&mut self.device);
        }
        if let Some(mut geometry) = self.geometry.take() {
            geometry.release(&mut self.device);
        }
        if let Some(mut program) = self.program.take() {
            program.release(&mut self.device);
        }
    }
}

impl<D: Device> Drop for RenderLoop<D> {
    fn drop(&mut self) {
        self.unload();
    }
}

impl<D: Device> FrameHandler for RenderLoop<D> {
    fn on_resize(&mut self, width: u32, height: u32) {
        self.resize(width, height);
    }

    fn on_load(&mut self) -> Result<(), RenderError> {
        self.load()
    }

    fn on_update(&mut self, dt: f64) -> Result<(), RenderError> {
        self.update(dt)
    }

    fn on_render(&mut self) -> Result<LoopControl, RenderError> {
        self.render().map(|_| LoopControl::Continue)
    }

    fn on_unload(&mut self) {
        self.unload();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::scene::SceneVariant;

    fn scene(variant: SceneVariant) -> SceneConfig {
        SceneConfig {
            width: 64,
            height: 48,
            ..SceneConfig::for_variant(variant)
        }
    }

    fn loaded(variant: SceneVariant) -> RenderLoop<SoftwareDevice> {
        let mut rl = RenderLoop::new(SoftwareDevice::new(64, 48), scene(variant)).unwrap();
        rl.load().unwrap();
        rl
    }

    #[test]
    fn load_configures_fixed_state_once() {
        let rl = loaded(SceneVariant::Triangle);
        let dev = rl.device();
        assert_eq!(rl.state(), LoopState::Loaded);
        assert_eq!(dev.clear_color_value(), [0.5, 0.7, 0.8, 1.0]);
        assert_eq!(dev.depth_test(), Some(DepthFunc::Less));
        assert!(dev.culls_back_faces());
        assert_eq!(dev.viewport_rect(), [0, 0, 64, 48]);
        assert_eq!(dev.live_objects().shaders, 0, "stage objects freed after link");
        assert_eq!(dev.live_objects().programs, 1);
    }

    #[test]
    fn load_caches_every_uniform_the_variant_writes() {
        let rl = loaded(SceneVariant::Triangle);
        let program = rl.program().unwrap();
        for name in [MODEL_UNIFORM, VIEW_UNIFORM, PROJECTION_UNIFORM, COLOR_UNIFORM] {
            assert!(program.uniform_location(name).is_some(), "{name} not cached");
        }

        let rl = loaded(SceneVariant::TexturedCube);
        let program = rl.program().unwrap();
        assert!(program.uniform_location(TEXTURE_UNIFORM).is_some());
        assert!(program.uniform_location(COLOR_UNIFORM).is_none());
    }

    #[test]
    fn gl_extent_saturates_instead_of_wrapping() {
        assert_eq!(gl_extent(1280), 1280);
        assert_eq!(gl_extent(i32::MAX as u32), i32::MAX);
        assert_eq!(gl_extent(u32::MAX), i32::MAX);
    }

    #[test]
    fn render_before_update_is_rejected() {
        let mut rl = loaded(SceneVariant::Triangle);
        let err = rl.render().unwrap_err();
        assert!(
            matches!(err, RenderError::InvalidTransition { ref event, .. } if event == "render"),
            "got {err:?}"
        );
    }

    #[test]
    fn update_before_load_is_rejected() {
        let mut rl = RenderLoop::new(SoftwareDevice::new(8, 8), scene(SceneVariant::Triangle)).unwrap();
        assert!(rl.update(0.1).is_err());
        assert_eq!(rl.state(), LoopState::Uninitialized);
    }

    #[test]
    fn load_twice_is_rejected() {
        let mut rl = loaded(SceneVariant::Triangle);
        assert!(rl.load().is_err());
    }

    #[test]
    fn frame_uploads_matrices_and_draws_once() {
        let mut rl = loaded(SceneVariant::ColorCube);
        rl.update(0.25).unwrap();
        let transforms = rl.render().unwrap();
        assert_eq!(rl.state(), LoopState::Rendering);

        let program = rl.program().and_then(ShaderProgram::handle).unwrap();
        let dev = rl.device();
        assert_eq!(dev.uniform_mat4(program, "uModel"), Some(transforms.model));
        assert_eq!(dev.uniform_mat4(program, "uView"), Some(transforms.view));
        assert_eq!(dev.uniform_mat4(program, "uProj"), Some(transforms.projection));
        assert_eq!(dev.draw_calls(), 1);
        assert_eq!(dev.frames_presented(), 1);
        assert_eq!(dev.current_program(), None, "program unbound after frame");
        let background = dev.pixel(0, 0).unwrap();
        assert!(dev.covered_pixels(background) > 0, "cube is visible");
    }

    #[test]
    fn triangle_is_drawn_in_flat_purple() {
        let mut rl = loaded(SceneVariant::Triangle);
        rl.update(0.0).unwrap();
        rl.render().unwrap();
        let center = rl.device().pixel(32, 24).unwrap();
        assert_eq!(center, [153, 51, 204, 255]);
    }

    #[test]
    fn textured_scene_generates_fallback_texture() {
        let mut rl = loaded(SceneVariant::TexturedCube);
        let tex = rl.texture().and_then(TextureResource::handle).unwrap();
        assert_eq!(rl.device().texture_info(tex).unwrap().width, CHECKERBOARD_SIZE);
        rl.update(0.1).unwrap();
        rl.render().unwrap();
        let program = rl.program().and_then(ShaderProgram::handle).unwrap();
        assert_eq!(rl.device().uniform_i32(program, "uTexture"), Some(0));
    }

    #[test]
    fn resize_changes_projection_only() {
        let mut rl = loaded(SceneVariant::Triangle);
        rl.update(0.3).unwrap();
        let before = rl.transforms();
        rl.resize(100, 20);
        let after = rl.transforms();
        assert_eq!(rl.state(), LoopState::Updating, "resize is not a transition");
        assert_eq!(before.model, after.model);
        assert_eq!(before.view, after.view);
        assert_ne!(before.projection, after.projection);
        assert_eq!(rl.device().viewport_rect(), [0, 0, 100, 20]);
        assert_eq!(rl.device().surface_size(), (100, 20));
    }

    #[test]
    fn unload_releases_everything_once() {
        let mut rl = loaded(SceneVariant::TexturedCube);
        rl.update(0.1).unwrap();
        rl.render().unwrap();
        rl.unload();
        assert_eq!(rl.state(), LoopState::Unloaded);
        assert_eq!(rl.device().live_objects().total(), 0);
        rl.unload();
        assert!(rl.update(0.1).is_err(), "unloaded is terminal");
    }

    #[test]
    fn failed_load_leaves_nothing_allocated() {
        let mut dev = SoftwareDevice::new(8, 8);
        dev.simulate_out_of_memory(true);
        let mut rl = RenderLoop::new(dev, scene(SceneVariant::ColorCube)).unwrap();
        let err = rl.load().unwrap_err();
        assert!(matches!(err, RenderError::ResourceCreation { .. }), "got {err:?}");
        assert_eq!(rl.state(), LoopState::Uninitialized);
        assert_eq!(rl.device().live_objects().total(), 0);
        rl.unload();
        assert_eq!(rl.state(), LoopState::Unloaded);
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut config = scene(SceneVariant::Triangle);
        config.camera.near = -1.0;
        assert!(RenderLoop::new(SoftwareDevice::new(8, 8), config).is_err());
    }
}
