//! Error types for the prism engine core.

use thiserror::Error;

/// Errors produced while creating GPU resources or driving the render loop.
///
/// Every variant is fatal for the operation that produced it. Nothing in the
/// engine retries: these are programmer or environment errors (bad shader
/// source, unsupported driver), not transient conditions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    /// The driver refused to allocate a buffer, vertex array, or texture.
    #[error("failed to create {resource}: {reason}")]
    ResourceCreation {
        /// Kind of object that could not be created (e.g. "vertex buffer").
        resource: String,
        /// Driver message or error code.
        reason: String,
    },

    /// A shader stage failed to compile.
    #[error("shader compile error ({stage}):\n{log}")]
    ShaderCompile {
        /// The shader stage that failed ("vertex" or "fragment").
        stage: String,
        /// The driver's info log, prefixed with the numbered source.
        log: String,
    },

    /// The compiled stages could not be linked into one program.
    #[error("shader link error:\n{0}")]
    ShaderLink(String),

    /// The vertex layout does not match the vertex shader's declared inputs.
    #[error("vertex layout mismatch: {0}")]
    LayoutMismatch(String),

    /// Pixel data did not match the declared texture dimensions or format.
    #[error("invalid texture: {0}")]
    InvalidTexture(String),

    /// A render loop callback arrived in a state that cannot accept it.
    #[error("cannot {event} while render loop is {state}")]
    InvalidTransition {
        /// The loop state when the callback arrived.
        state: String,
        /// The callback that was rejected.
        event: String,
    },

    /// A scene configuration value is out of range.
    #[error("invalid scene config: {0}")]
    InvalidConfig(String),
}

impl RenderError {
    /// Shorthand for a [`RenderError::ResourceCreation`].
    pub fn resource(resource: &str, reason: impl Into<String>) -> Self {
        RenderError::ResourceCreation {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}
