//! Model, view and projection matrices for one frame.
//!
//! Column vectors throughout: a vertex reaches clip space as
//! `projection * view * model * local`, and the model matrix is
//! `translation * rotation * scale`.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::animation::{AnimationSpec, AnimationState};

/// Fixed look-at camera with a perspective lens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 80.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

impl CameraConfig {
    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// OpenGL-style perspective (clip z in `[-w, w]`).
    pub fn projection(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh_gl(self.fov_y_degrees.to_radians(), aspect, self.near, self.far)
    }
}

/// Width over height; a zero height counts as one pixel.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    width as f32 / height.max(1) as f32
}

/// Matrices derived for a single frame. Never cached across frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
}

impl FrameTransforms {
    pub fn mvp(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

/// Derives [`FrameTransforms`] from animation state and the viewport aspect.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TransformPipeline {
    pub camera: CameraConfig,
    pub animation: AnimationSpec,
}

impl TransformPipeline {
    pub fn new(camera: CameraConfig, animation: AnimationSpec) -> Self {
        Self { camera, animation }
    }

    pub fn model(&self, state: &AnimationState) -> Mat4 {
        let translation = Vec3::new(0.0, state.bob_offset(&self.animation), 0.0);
        let axis = self.animation.spin_axis.normalize_or_zero();
        let rotation = if axis == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_axis_angle(axis, state.angle as f32)
        };
        let scale = Vec3::splat(state.scale(&self.animation));
        Mat4::from_translation(translation) * Mat4::from_quat(rotation) * Mat4::from_scale(scale)
    }

    pub fn compute(&self, state: &AnimationState, aspect: f32) -> FrameTransforms {
        FrameTransforms {
            model: self.model(state),
            view: self.camera.view(),
            projection: self.camera.projection(aspect),
        }
    }
}
