//! Live OpenGL backend.
//!
//! This module is only available when the `render` feature is enabled.
//! [`GlowDevice`] implements [`Device`](crate::device::Device) over a
//! `glow::Context`; everything above the device seam is shared with the
//! software backend.

pub mod glow_device;

pub use glow_device::{GlowDevice, PresentFn};
