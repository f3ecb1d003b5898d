//! GPU-resident vertex data with its attribute layout.

use crate::device::{check_error, Device, PrimitiveKind};
use crate::error::RenderError;
use crate::vertex::VertexLayout;

/// One static vertex buffer plus the vertex array that describes it.
///
/// Built once at load time and immutable afterwards. `bind`/`unbind` may be
/// repeated freely; `draw` needs a prior `bind` in the same frame.
pub struct GeometryBuffer<D: Device> {
    buffer: Option<D::Buffer>,
    vertex_array: Option<D::VertexArray>,
    layout: VertexLayout,
    vertex_count: usize,
}

impl<D: Device> GeometryBuffer<D> {
    /// Uploads `vertices` once as static storage described by `layout`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::LayoutMismatch`] if `vertices` is not a whole number
    ///   of vertices for `layout`.
    /// - [`RenderError::ResourceCreation`] if the driver refuses the buffer or
    ///   vertex array, or reports an error while uploading. Anything created
    ///   before the failure is deleted.
    pub fn build(device: &mut D, vertices: &[f32], layout: VertexLayout) -> Result<Self, RenderError> {
        let vertex_count = layout.vertex_count(vertices)?;

        let buffer = device
            .create_buffer()
            .map_err(|e| RenderError::resource("vertex buffer", e))?;
        let vertex_array = match device.create_vertex_array() {
            Ok(v) => v,
            Err(e) => {
                device.delete_buffer(buffer);
                return Err(RenderError::resource("vertex array", e));
            }
        };

        let mut geometry = Self {
            buffer: Some(buffer),
            vertex_array: Some(vertex_array),
            layout,
            vertex_count,
        };

        device.bind_vertex_array(Some(vertex_array));
        device.bind_array_buffer(Some(buffer));
        device.buffer_data_static(vertices);
        for attribute in geometry.layout.attributes() {
            device.vertex_attrib_pointer_f32(attribute);
            device.enable_vertex_attrib_array(attribute.index);
        }
        device.bind_vertex_array(None);
        device.bind_array_buffer(None);

        if let Err(e) = check_error(device, "vertex buffer") {
            geometry.release(device);
            return Err(e);
        }

        log::debug!(
            "built geometry: {vertex_count} vertices, stride {} bytes",
            geometry.layout.stride_bytes()
        );
        Ok(geometry)
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn vertex_array(&self) -> Option<D::VertexArray> {
        self.vertex_array
    }

    pub fn buffer(&self) -> Option<D::Buffer> {
        self.buffer
    }

    pub fn bind(&self, device: &mut D) {
        if let Some(vertex_array) = self.vertex_array {
            device.bind_vertex_array(Some(vertex_array));
        }
    }

    pub fn unbind(&self, device: &mut D) {
        device.bind_vertex_array(None);
    }

    /// Issues one draw of the first `count` vertices. Requires [`bind`](Self::bind).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::LayoutMismatch`] if `count` exceeds the stored
    /// vertex count, and [`RenderError::ResourceCreation`] once released.
    /// Nothing reaches the device in either case.
    pub fn draw(&self, device: &mut D, kind: PrimitiveKind, count: usize) -> Result<(), RenderError> {
        if self.vertex_array.is_none() {
            return Err(RenderError::resource("vertex array", "drawn after release"));
        }
        if count > self.vertex_count {
            return Err(RenderError::LayoutMismatch(format!(
                "draw of {count} vertices past the {} in the buffer",
                self.vertex_count
            )));
        }
        let count = i32::try_from(count).map_err(|_| {
            RenderError::LayoutMismatch(format!("{count} vertices exceed one draw call"))
        })?;
        device.draw_arrays(kind, 0, count);
        Ok(())
    }

    /// Draws every vertex in the buffer.
    pub fn draw_all(&self, device: &mut D, kind: PrimitiveKind) -> Result<(), RenderError> {
        self.draw(device, kind, self.vertex_count)
    }

    /// Unbinds and deletes the buffer, then the vertex array. Safe to call
    /// more than once.
    pub fn release(&mut self, device: &mut D) {
        if self.buffer.is_none() && self.vertex_array.is_none() {
            log::trace!("geometry already released");
            return;
        }
        if let Some(buffer) = self.buffer.take() {
            device.bind_array_buffer(None);
            device.delete_buffer(buffer);
        }
        if let Some(vertex_array) = self.vertex_array.take() {
            device.bind_vertex_array(None);
            device.delete_vertex_array(vertex_array);
        }
        log::debug!("released geometry");
    }

    pub fn is_released(&self) -> bool {
        self.buffer.is_none() && self.vertex_array.is_none()
    }
}

impl<D: Device> Drop for GeometryBuffer<D> {
    fn drop(&mut self) {
        if !self.is_released() {
            log::warn!("geometry buffer dropped without release");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::SoftwareDevice;
    use crate::primitives;
    use crate::shader::ShaderProgram;
    use crate::vertex::{VertexFormat, VertexLayout};

    const TRIANGLE: [f32; 9] = [0.0, 0.5, 0.0, -0.5, -0.5, 0.0, 0.5, -0.5, 0.0];

    fn position_layout() -> VertexLayout {
        VertexLayout::for_format(VertexFormat::Position)
    }

    #[test]
    fn build_uploads_data_and_counts_vertices() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut geometry = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout()).unwrap();
        assert_eq!(geometry.vertex_count(), 3);
        let buffer = geometry.buffer().unwrap();
        assert_eq!(dev.buffer_contents(buffer), Some(&TRIANGLE[..]));
        assert_eq!(dev.bound_vertex_array(), None, "build leaves nothing bound");
        geometry.release(&mut dev);
    }

    #[test]
    fn release_twice_does_not_fault() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut geometry = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout()).unwrap();
        geometry.release(&mut dev);
        geometry.release(&mut dev);
        assert!(geometry.is_released());
        assert_eq!(dev.live_objects().buffers, 0);
        assert_eq!(dev.live_objects().vertex_arrays, 0);
        assert!(dev.get_error().is_none());
    }

    #[test]
    fn refused_allocation_is_resource_creation_error() {
        let mut dev = SoftwareDevice::new(4, 4);
        dev.refuse_object_creation(true);
        let err = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout())
            .err()
            .expect("build should fail");
        assert!(matches!(err, RenderError::ResourceCreation { .. }), "got {err:?}");
    }

    #[test]
    fn out_of_memory_upload_fails_and_cleans_up() {
        let mut dev = SoftwareDevice::new(4, 4);
        dev.simulate_out_of_memory(true);
        let err = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout())
            .err()
            .expect("build should fail");
        assert!(format!("{err}").contains("GL_OUT_OF_MEMORY"), "got: {err}");
        assert_eq!(dev.live_objects().total(), 0, "partial objects must be deleted");
    }

    #[test]
    fn ragged_vertex_data_is_rejected() {
        let mut dev = SoftwareDevice::new(4, 4);
        let result = GeometryBuffer::build(&mut dev, &TRIANGLE[..8], position_layout());
        assert!(matches!(result, Err(RenderError::LayoutMismatch(_))));
        assert_eq!(dev.live_objects().total(), 0);
    }

    #[test]
    fn bind_is_idempotent() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut geometry = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout()).unwrap();
        geometry.bind(&mut dev);
        geometry.bind(&mut dev);
        assert_eq!(dev.bound_vertex_array(), geometry.vertex_array());
        geometry.unbind(&mut dev);
        geometry.unbind(&mut dev);
        assert_eq!(dev.bound_vertex_array(), None);
        assert!(dev.get_error().is_none());
        geometry.release(&mut dev);
    }

    #[test]
    fn draw_past_vertex_count_is_refused() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut program = ShaderProgram::compile(
            &mut dev,
            primitives::TRIANGLE_VERTEX_SHADER,
            primitives::TRIANGLE_FRAGMENT_SHADER,
        )
        .unwrap();
        let mut geometry = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout()).unwrap();
        program.use_program(&mut dev);
        geometry.bind(&mut dev);
        let err = geometry.draw(&mut dev, PrimitiveKind::Triangles, 6).unwrap_err();
        assert!(matches!(err, RenderError::LayoutMismatch(_)), "got {err:?}");
        assert_eq!(dev.draw_calls(), 0, "nothing reaches the device");

        geometry.draw(&mut dev, PrimitiveKind::Triangles, 3).unwrap();
        assert_eq!(dev.draw_calls(), 1);
        geometry.unbind(&mut dev);
        geometry.release(&mut dev);
        program.release(&mut dev);
    }

    #[test]
    fn draw_after_release_is_refused() {
        let mut dev = SoftwareDevice::new(4, 4);
        let mut geometry = GeometryBuffer::build(&mut dev, &TRIANGLE, position_layout()).unwrap();
        geometry.release(&mut dev);
        assert!(geometry.draw_all(&mut dev, PrimitiveKind::Triangles).is_err());
        assert_eq!(dev.draw_calls(), 0);
    }
}
