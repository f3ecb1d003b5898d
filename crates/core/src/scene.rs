//! Scene variants and their JSON configuration.
//!
//! Each variant is a vertex layout, a shader pair and default animation
//! parameters for the same [`RenderLoop`](crate::render_loop::RenderLoop).

use std::fmt;
use std::str::FromStr;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::animation::{AnimationSpec, Oscillation};
use crate::error::RenderError;
use crate::primitives;
use crate::transform::{CameraConfig, TransformPipeline};
use crate::vertex::{Vertex, VertexFormat};

/// Default surface size in pixels.
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 768;

/// Default clear color, a pale sky blue.
pub const DEFAULT_CLEAR_COLOR: [f32; 4] = [0.5, 0.7, 0.8, 1.0];

/// Flat color of the triangle variant.
pub const TRIANGLE_COLOR: Vec3 = Vec3::new(0.6, 0.2, 0.8);

/// The built-in scenes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneVariant {
    /// A flat purple triangle that spins about +Y and pulses in scale.
    #[default]
    Triangle,
    /// A cube with one vertex color per face.
    ColorCube,
    /// A cube sampling a 2D texture on every face.
    TexturedCube,
}

impl SceneVariant {
    pub const ALL: [SceneVariant; 3] = [
        SceneVariant::Triangle,
        SceneVariant::ColorCube,
        SceneVariant::TexturedCube,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SceneVariant::Triangle => "triangle",
            SceneVariant::ColorCube => "color_cube",
            SceneVariant::TexturedCube => "textured_cube",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            SceneVariant::Triangle => "flat-colored triangle, spinning and pulsing",
            SceneVariant::ColorCube => "cube with per-face vertex colors, spinning and bobbing",
            SceneVariant::TexturedCube => "cube sampling a texture on every face",
        }
    }

    pub fn vertex_format(self) -> VertexFormat {
        match self {
            SceneVariant::Triangle => VertexFormat::Position,
            SceneVariant::ColorCube => VertexFormat::PositionColor,
            SceneVariant::TexturedCube => VertexFormat::PositionTexCoord,
        }
    }

    pub fn vertices(self) -> Vec<Vertex> {
        match self {
            SceneVariant::Triangle => primitives::triangle(),
            SceneVariant::ColorCube => primitives::color_cube(),
            SceneVariant::TexturedCube => primitives::textured_cube(),
        }
    }

    /// `(vertex, fragment)` GLSL sources.
    pub fn shader_sources(self) -> (&'static str, &'static str) {
        match self {
            SceneVariant::Triangle => (
                primitives::TRIANGLE_VERTEX_SHADER,
                primitives::TRIANGLE_FRAGMENT_SHADER,
            ),
            SceneVariant::ColorCube => (
                primitives::COLOR_VERTEX_SHADER,
                primitives::COLOR_FRAGMENT_SHADER,
            ),
            SceneVariant::TexturedCube => (
                primitives::TEXTURE_VERTEX_SHADER,
                primitives::TEXTURE_FRAGMENT_SHADER,
            ),
        }
    }

    pub fn uses_texture(self) -> bool {
        matches!(self, SceneVariant::TexturedCube)
    }

    /// Whether the fragment shader takes its color from a `uColor` uniform.
    pub fn uses_flat_color(self) -> bool {
        matches!(self, SceneVariant::Triangle)
    }

    pub fn default_animation(self) -> AnimationSpec {
        match self {
            SceneVariant::Triangle => AnimationSpec {
                spin_rate: 1.0,
                spin_axis: Vec3::Y,
                bob: Oscillation::NONE,
                pulse: Oscillation::between(0.0, 1.0, 2.0),
            },
            SceneVariant::ColorCube => AnimationSpec {
                spin_rate: 1.0,
                spin_axis: Vec3::new(0.5, 1.0, 0.0),
                bob: Oscillation::new(0.25, 1.5),
                pulse: Oscillation::NONE,
            },
            SceneVariant::TexturedCube => AnimationSpec {
                spin_rate: 0.8,
                spin_axis: Vec3::new(0.3, 1.0, 0.0),
                bob: Oscillation::NONE,
                pulse: Oscillation::NONE,
            },
        }
    }
}

impl fmt::Display for SceneVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SceneVariant {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        SceneVariant::ALL
            .into_iter()
            .find(|v| v.name() == key)
            .ok_or_else(|| {
                let names: Vec<&str> = SceneVariant::ALL.iter().map(|v| v.name()).collect();
                RenderError::InvalidConfig(format!(
                    "unknown scene '{s}', expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// Everything needed to set up one scene.
///
/// Missing fields take their defaults; a missing `animation` takes the
/// variant's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub variant: SceneVariant,
    pub width: u32,
    pub height: u32,
    pub clear_color: [f32; 4],
    pub camera: CameraConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<AnimationSpec>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self::for_variant(SceneVariant::default())
    }
}

impl SceneConfig {
    pub fn for_variant(variant: SceneVariant) -> Self {
        Self {
            variant,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            clear_color: DEFAULT_CLEAR_COLOR,
            camera: CameraConfig::default(),
            animation: None,
        }
    }

    /// Parses and validates a JSON scene description.
    pub fn from_json(json: &str) -> Result<Self, RenderError> {
        let config: SceneConfig = serde_json::from_str(json)
            .map_err(|e| RenderError::InvalidConfig(format!("scene config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, RenderError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RenderError::InvalidConfig(format!("scene config: {e}")))
    }

    /// The animation in effect: the explicit one, else the variant default.
    pub fn animation(&self) -> AnimationSpec {
        self.animation
            .unwrap_or_else(|| self.variant.default_animation())
    }

    pub fn pipeline(&self) -> TransformPipeline {
        TransformPipeline::new(self.camera, self.animation())
    }

    /// Rejects settings that would produce a degenerate projection or
    /// rotation.
    pub fn validate(&self) -> Result<(), RenderError> {
        let invalid = |msg: String| Err(RenderError::InvalidConfig(msg));
        let cam = &self.camera;

        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "surface size {}x{} must be non-zero",
                self.width, self.height
            ));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return invalid(format!(
                "surface size {}x{} exceeds {} pixels per side",
                self.width,
                self.height,
                i32::MAX
            ));
        }
        if !(cam.fov_y_degrees > 0.0 && cam.fov_y_degrees < 180.0) {
            return invalid(format!(
                "fov_y_degrees {} must be in (0, 180)",
                cam.fov_y_degrees
            ));
        }
        if !(cam.near > 0.0 && cam.far > cam.near) {
            return invalid(format!(
                "clip planes near {} / far {} must satisfy 0 < near < far",
                cam.near, cam.far
            ));
        }
        if (cam.target - cam.eye).length_squared() <= f32::EPSILON {
            return invalid("camera eye and target coincide".into());
        }
        if (cam.target - cam.eye).cross(cam.up).length_squared() <= f32::EPSILON {
            return invalid("camera up vector is parallel to the view direction".into());
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return invalid("clear_color must be finite".into());
        }

        let anim = self.animation();
        if anim.spin_axis.length_squared() <= f32::EPSILON {
            return invalid("spin_axis must be non-zero".into());
        }
        let scalars = [
            anim.spin_rate,
            anim.bob.amplitude,
            anim.bob.rate,
            anim.bob.offset,
            anim.bob.phase_shift,
            anim.pulse.amplitude,
            anim.pulse.rate,
            anim.pulse.offset,
            anim.pulse.phase_shift,
        ];
        if scalars.iter().any(|v| !v.is_finite()) {
            return invalid("animation parameters must be finite".into());
        }
        Ok(())
    }
}
