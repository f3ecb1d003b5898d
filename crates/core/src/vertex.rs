//! Vertex records and the packed attribute layout shared by one buffer.
//!
//! A [`VertexLayout`] describes how interleaved `f32` data maps onto shader
//! input locations. Once a [`GeometryBuffer`](crate::geometry::GeometryBuffer)
//! is built from a layout, the layout never changes.

use glam::{Vec2, Vec3};

use crate::error::RenderError;

/// Size of one `f32` component in bytes.
pub const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// Shader input location of the position attribute.
pub const POSITION_LOCATION: u32 = 0;
/// Shader input location of the optional color attribute.
pub const COLOR_LOCATION: u32 = 1;
/// Shader input location of the optional texture coordinate attribute.
pub const TEX_COORD_LOCATION: u32 = 2;

/// One attribute of an interleaved vertex: `(index, componentCount, strideBytes, offsetBytes)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Shader input location.
    pub index: u32,
    /// Number of `f32` components (1..=4).
    pub components: u32,
    /// Distance in bytes between consecutive vertices.
    pub stride_bytes: usize,
    /// Byte offset of this attribute inside one vertex.
    pub offset_bytes: usize,
}

impl VertexAttribute {
    /// Byte offset one past the end of this attribute.
    pub fn end_bytes(&self) -> usize {
        self.offset_bytes + self.components as usize * FLOAT_SIZE
    }
}

/// Validated, immutable description of an interleaved vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
    stride_bytes: usize,
}

impl VertexLayout {
    /// Builds a layout from explicit attribute descriptions.
    ///
    /// All attributes must share one stride, fit inside it, use 1..=4
    /// components, and occupy distinct locations.
    pub fn new(attributes: Vec<VertexAttribute>) -> Result<Self, RenderError> {
        let Some(first) = attributes.first() else {
            return Err(RenderError::LayoutMismatch("layout has no attributes".into()));
        };
        let stride_bytes = first.stride_bytes;
        if stride_bytes == 0 || stride_bytes % FLOAT_SIZE != 0 {
            return Err(RenderError::LayoutMismatch(format!(
                "stride {stride_bytes} is not a positive multiple of {FLOAT_SIZE}"
            )));
        }

        for (i, attr) in attributes.iter().enumerate() {
            if attr.stride_bytes != stride_bytes {
                return Err(RenderError::LayoutMismatch(format!(
                    "location {} has stride {} but the layout stride is {stride_bytes}",
                    attr.index, attr.stride_bytes
                )));
            }
            if !(1..=4).contains(&attr.components) {
                return Err(RenderError::LayoutMismatch(format!(
                    "location {} has {} components",
                    attr.index, attr.components
                )));
            }
            if attr.offset_bytes % FLOAT_SIZE != 0 || attr.end_bytes() > stride_bytes {
                return Err(RenderError::LayoutMismatch(format!(
                    "location {} at offset {} does not fit in stride {stride_bytes}",
                    attr.index, attr.offset_bytes
                )));
            }
            if attributes[..i].iter().any(|a| a.index == attr.index) {
                return Err(RenderError::LayoutMismatch(format!(
                    "location {} declared twice",
                    attr.index
                )));
            }
        }

        Ok(Self {
            attributes,
            stride_bytes,
        })
    }

    /// Builds a tightly packed layout from `(index, componentCount)` pairs in
    /// buffer order.
    pub fn packed(attributes: &[(u32, u32)]) -> Result<Self, RenderError> {
        let stride_bytes = attributes
            .iter()
            .map(|&(_, n)| n as usize * FLOAT_SIZE)
            .sum();
        let mut offset_bytes = 0;
        let attributes = attributes
            .iter()
            .map(|&(index, components)| {
                let attr = VertexAttribute {
                    index,
                    components,
                    stride_bytes,
                    offset_bytes,
                };
                offset_bytes += components as usize * FLOAT_SIZE;
                attr
            })
            .collect();
        Self::new(attributes)
    }

    /// Layout for a [`VertexFormat`].
    pub fn for_format(format: VertexFormat) -> Self {
        let (attrs, stride_bytes): (&[(u32, u32, usize)], usize) = match format {
            VertexFormat::Position => (&[(POSITION_LOCATION, 3, 0)], 12),
            VertexFormat::PositionColor => {
                (&[(POSITION_LOCATION, 3, 0), (COLOR_LOCATION, 3, 12)], 24)
            }
            VertexFormat::PositionTexCoord => {
                (&[(POSITION_LOCATION, 3, 0), (TEX_COORD_LOCATION, 2, 12)], 20)
            }
        };
        Self {
            attributes: attrs
                .iter()
                .map(|&(index, components, offset_bytes)| VertexAttribute {
                    index,
                    components,
                    stride_bytes,
                    offset_bytes,
                })
                .collect(),
            stride_bytes,
        }
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Attribute bound to shader location `index`, if any.
    pub fn attribute(&self, index: u32) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.index == index)
    }

    /// Bytes per vertex.
    pub fn stride_bytes(&self) -> usize {
        self.stride_bytes
    }

    /// Floats per vertex.
    pub fn stride_floats(&self) -> usize {
        self.stride_bytes / FLOAT_SIZE
    }

    /// Number of whole vertices in `data`, or an error if `data` is ragged.
    pub fn vertex_count(&self, data: &[f32]) -> Result<usize, RenderError> {
        let stride = self.stride_floats();
        if data.len() % stride != 0 {
            return Err(RenderError::LayoutMismatch(format!(
                "{} floats is not a whole number of {stride}-float vertices",
                data.len()
            )));
        }
        Ok(data.len() / stride)
    }
}

/// The attribute combinations used by the built-in scene variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Position,
    PositionColor,
    PositionTexCoord,
}

/// A single vertex: a position with optional color and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Option<Vec3>,
    pub tex_coord: Option<Vec2>,
}

impl Vertex {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            color: None,
            tex_coord: None,
        }
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_tex_coord(mut self, tex_coord: Vec2) -> Self {
        self.tex_coord = Some(tex_coord);
        self
    }

    /// The format this vertex naturally packs into.
    pub fn format(&self) -> VertexFormat {
        match (self.color, self.tex_coord) {
            (Some(_), _) => VertexFormat::PositionColor,
            (None, Some(_)) => VertexFormat::PositionTexCoord,
            (None, None) => VertexFormat::Position,
        }
    }
}

/// Interleaves vertices into flat `f32` data for `format`.
///
/// Every vertex must carry the attributes the format requires; all vertices
/// in one buffer share one layout.
pub fn pack_vertices(vertices: &[Vertex], format: VertexFormat) -> Result<Vec<f32>, RenderError> {
    let layout = VertexLayout::for_format(format);
    let mut data = Vec::with_capacity(vertices.len() * layout.stride_floats());
    for (i, v) in vertices.iter().enumerate() {
        data.extend_from_slice(&v.position.to_array());
        match format {
            VertexFormat::Position => {}
            VertexFormat::PositionColor => {
                let color = v.color.ok_or_else(|| {
                    RenderError::LayoutMismatch(format!("vertex {i} has no color"))
                })?;
                data.extend_from_slice(&color.to_array());
            }
            VertexFormat::PositionTexCoord => {
                let uv = v.tex_coord.ok_or_else(|| {
                    RenderError::LayoutMismatch(format!("vertex {i} has no texture coordinate"))
                })?;
                data.extend_from_slice(&uv.to_array());
            }
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_layout_computes_offsets_and_stride() {
        let layout = VertexLayout::packed(&[(0, 3), (1, 3)]).unwrap();
        assert_eq!(layout.stride_bytes(), 24);
        assert_eq!(layout.attributes()[0].offset_bytes, 0);
        assert_eq!(layout.attributes()[1].offset_bytes, 12);
        assert!(layout.attributes().iter().all(|a| a.stride_bytes == 24));
    }

    #[test]
    fn for_format_matches_packed_equivalent() {
        let packed = VertexLayout::packed(&[(0, 3), (2, 2)]).unwrap();
        assert_eq!(VertexLayout::for_format(VertexFormat::PositionTexCoord), packed);
    }

    #[test]
    fn empty_layout_is_rejected() {
        assert!(VertexLayout::new(Vec::new()).is_err());
    }

    #[test]
    fn duplicate_location_is_rejected() {
        let err = VertexLayout::packed(&[(0, 3), (0, 2)]).unwrap_err();
        assert!(format!("{err}").contains("declared twice"), "got: {err}");
    }

    #[test]
    fn attribute_overflowing_stride_is_rejected() {
        let attrs = vec![VertexAttribute {
            index: 0,
            components: 3,
            stride_bytes: 8,
            offset_bytes: 0,
        }];
        assert!(VertexLayout::new(attrs).is_err());
    }

    #[test]
    fn mixed_strides_are_rejected() {
        let attrs = vec![
            VertexAttribute {
                index: 0,
                components: 3,
                stride_bytes: 24,
                offset_bytes: 0,
            },
            VertexAttribute {
                index: 1,
                components: 3,
                stride_bytes: 20,
                offset_bytes: 12,
            },
        ];
        assert!(VertexLayout::new(attrs).is_err());
    }

    #[test]
    fn five_components_is_rejected() {
        assert!(VertexLayout::packed(&[(0, 5)]).is_err());
    }

    #[test]
    fn vertex_count_rejects_ragged_data() {
        let layout = VertexLayout::for_format(VertexFormat::Position);
        assert_eq!(layout.vertex_count(&[0.0; 9]).unwrap(), 3);
        assert!(layout.vertex_count(&[0.0; 10]).is_err());
    }

    #[test]
    fn pack_vertices_interleaves_position_and_color() {
        let verts = [
            Vertex::new(Vec3::new(1.0, 2.0, 3.0)).with_color(Vec3::new(0.1, 0.2, 0.3)),
            Vertex::new(Vec3::new(4.0, 5.0, 6.0)).with_color(Vec3::new(0.4, 0.5, 0.6)),
        ];
        let data = pack_vertices(&verts, VertexFormat::PositionColor).unwrap();
        assert_eq!(
            data,
            vec![1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 4.0, 5.0, 6.0, 0.4, 0.5, 0.6]
        );
    }

    #[test]
    fn pack_vertices_requires_format_attributes() {
        let verts = [Vertex::new(Vec3::ZERO)];
        assert!(pack_vertices(&verts, VertexFormat::PositionTexCoord).is_err());
    }

    #[test]
    fn vertex_format_follows_optional_attributes() {
        let v = Vertex::new(Vec3::ZERO);
        assert_eq!(v.format(), VertexFormat::Position);
        assert_eq!(v.with_tex_coord(Vec2::ONE).format(), VertexFormat::PositionTexCoord);
        assert_eq!(v.with_color(Vec3::ONE).format(), VertexFormat::PositionColor);
    }
}
