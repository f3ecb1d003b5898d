#![deny(unsafe_code)]
//! Core of the prism engine.
//!
//! Renders small animated primitives through an OpenGL-shaped [`Device`]:
//! [`ShaderProgram`], [`GeometryBuffer`] and [`TextureResource`] own GPU
//! objects, [`TransformPipeline`] derives per-frame matrices from
//! [`AnimationState`], and [`RenderLoop`] ties them together as a state
//! machine driven through the [`FrameHandler`] callbacks.
//!
//! [`SoftwareDevice`] is a CPU rasterizer for tests and headless runs; the
//! `render` feature adds `GlowDevice` for live OpenGL.

pub mod animation;
pub mod device;
pub mod error;
pub mod geometry;
pub mod glsl;
pub mod host;
pub mod logging;
pub mod primitives;
pub mod render_loop;
pub mod scene;
pub mod shader;
pub mod texture;
pub mod time;
pub mod transform;
pub mod vertex;

#[cfg(feature = "render")]
pub mod render;

pub use animation::{AnimationSpec, AnimationState, Oscillation};
pub use device::{Device, SoftwareDevice};
pub use error::RenderError;
pub use geometry::GeometryBuffer;
pub use host::{FrameHandler, FramePump, LoopControl, Pacing, PumpControl, PumpReport, StopReason};
pub use logging::{init_logging, LoggingConfig, WriteStyle};
pub use render_loop::{LoopState, RenderLoop};
pub use scene::{SceneConfig, SceneVariant};
pub use shader::ShaderProgram;
pub use texture::{PixelData, TextureResource};
pub use time::{FrameClock, FrameTime};
pub use transform::{CameraConfig, FrameTransforms, TransformPipeline};
pub use vertex::{Vertex, VertexAttribute, VertexFormat, VertexLayout};
