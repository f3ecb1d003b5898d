//! Static geometry and shader sources for the built-in scenes.

use glam::{Vec2, Vec3};

use crate::vertex::Vertex;

/// A single triangle facing +Z, positions only.
pub fn triangle() -> Vec<Vertex> {
    vec![
        Vertex::new(Vec3::new(0.0, 0.5, 0.0)),
        Vertex::new(Vec3::new(-0.5, -0.5, 0.0)),
        Vertex::new(Vec3::new(0.5, -0.5, 0.0)),
    ]
}

/// Two counter-clockwise triangles covering `[-1, 1]²` at `z = 0`, with
/// texture coordinates spanning `[0, 1]²`.
pub fn unit_quad() -> Vec<Vertex> {
    let corner = |x: f32, y: f32| {
        Vertex::new(Vec3::new(x, y, 0.0)).with_tex_coord(Vec2::new((x + 1.0) / 2.0, (y + 1.0) / 2.0))
    };
    vec![
        corner(-1.0, -1.0),
        corner(1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, -1.0),
        corner(1.0, 1.0),
        corner(-1.0, 1.0),
    ]
}

struct Face {
    normal: Vec3,
    u: Vec3,
    v: Vec3,
    color: Vec3,
}

/// Cube faces; `u × v = normal` so corners walk counter-clockwise seen from outside.
const FACES: [Face; 6] = [
    Face {
        normal: Vec3::X,
        u: Vec3::NEG_Z,
        v: Vec3::Y,
        color: Vec3::new(0.9, 0.2, 0.2),
    },
    Face {
        normal: Vec3::NEG_X,
        u: Vec3::Z,
        v: Vec3::Y,
        color: Vec3::new(0.2, 0.9, 0.9),
    },
    Face {
        normal: Vec3::Y,
        u: Vec3::X,
        v: Vec3::NEG_Z,
        color: Vec3::new(0.2, 0.9, 0.2),
    },
    Face {
        normal: Vec3::NEG_Y,
        u: Vec3::X,
        v: Vec3::Z,
        color: Vec3::new(0.9, 0.2, 0.9),
    },
    Face {
        normal: Vec3::Z,
        u: Vec3::X,
        v: Vec3::Y,
        color: Vec3::new(0.2, 0.2, 0.9),
    },
    Face {
        normal: Vec3::NEG_Z,
        u: Vec3::NEG_X,
        v: Vec3::Y,
        color: Vec3::new(0.9, 0.9, 0.2),
    },
];

/// Corner offsets in face space and their texture coordinates, as two triangles.
const FACE_CORNERS: [(f32, f32); 6] = [
    (-1.0, -1.0),
    (1.0, -1.0),
    (1.0, 1.0),
    (-1.0, -1.0),
    (1.0, 1.0),
    (-1.0, 1.0),
];

fn cube(build: impl Fn(&Face, Vec3, Vec2) -> Vertex) -> Vec<Vertex> {
    FACES
        .iter()
        .flat_map(|face| {
            FACE_CORNERS.iter().map(move |&(a, b)| {
                let position = (face.normal + face.u * a + face.v * b) * 0.5;
                let uv = Vec2::new((a + 1.0) / 2.0, (b + 1.0) / 2.0);
                (face, position, uv)
            })
        })
        .map(|(face, position, uv)| build(face, position, uv))
        .collect()
}

/// A unit cube centred on the origin, 36 vertices with one color per face.
pub fn color_cube() -> Vec<Vertex> {
    cube(|face, position, _| Vertex::new(position).with_color(face.color))
}

/// A unit cube centred on the origin, 36 vertices with per-face `[0, 1]²`
/// texture coordinates.
pub fn textured_cube() -> Vec<Vertex> {
    cube(|_, position, uv| Vertex::new(position).with_tex_coord(uv))
}

pub const TRIANGLE_VERTEX_SHADER: &str = "#version 330 core
layout(location = 0) in vec3 aPosition;

uniform mat4 uModel;
uniform mat4 uView;
uniform mat4 uProj;

void main()
{
    gl_Position = uProj * uView * uModel * vec4(aPosition, 1.0);
}
";

pub const TRIANGLE_FRAGMENT_SHADER: &str = "#version 330 core
uniform vec3 uColor;

out vec4 FragColor;

void main()
{
    FragColor = vec4(uColor, 1.0);
}
";

pub const COLOR_VERTEX_SHADER: &str = "#version 330 core
layout(location = 0) in vec3 aPosition;
layout(location = 1) in vec3 aColor;

uniform mat4 uModel;
uniform mat4 uView;
uniform mat4 uProj;

out vec3 vColor;

void main()
{
    vColor = aColor;
    gl_Position = uProj * uView * uModel * vec4(aPosition, 1.0);
}
";

pub const COLOR_FRAGMENT_SHADER: &str = "#version 330 core
in vec3 vColor;

out vec4 FragColor;

void main()
{
    FragColor = vec4(vColor, 1.0);
}
";

pub const TEXTURE_VERTEX_SHADER: &str = "#version 330 core
layout(location = 0) in vec3 aPosition;
layout(location = 2) in vec2 aTexCoord;

uniform mat4 uModel;
uniform mat4 uView;
uniform mat4 uProj;

out vec2 vTexCoord;

void main()
{
    vTexCoord = aTexCoord;
    gl_Position = uProj * uView * uModel * vec4(aPosition, 1.0);
}
";

pub const TEXTURE_FRAGMENT_SHADER: &str = "#version 330 core
in vec2 vTexCoord;

uniform sampler2D uTexture;

out vec4 FragColor;

void main()
{
    FragColor = texture(uTexture, vTexCoord);
}
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glsl;
    use crate::vertex::{VertexFormat, VertexLayout};

    fn assert_outward_winding(vertices: &[Vertex]) {
        for (i, tri) in vertices.chunks_exact(3).enumerate() {
            let (a, b, c) = (tri[0].position, tri[1].position, tri[2].position);
            let normal = (b - a).cross(c - a);
            let centroid = (a + b + c) / 3.0;
            assert!(
                normal.dot(centroid) > 0.0,
                "triangle {i} winds inward: {a} {b} {c}"
            );
        }
    }

    #[test]
    fn cubes_have_36_vertices_inside_unit_box() {
        for cube in [color_cube(), textured_cube()] {
            assert_eq!(cube.len(), 36);
            assert!(cube
                .iter()
                .all(|v| v.position.abs().max_element() <= 0.5 + f32::EPSILON));
        }
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_from_outside() {
        assert_outward_winding(&color_cube());
        assert_outward_winding(&textured_cube());
    }

    #[test]
    fn quad_covers_clip_square_counter_clockwise() {
        let quad = unit_quad();
        assert_eq!(quad.len(), 6);
        for tri in quad.chunks_exact(3) {
            let z = (tri[1].position - tri[0].position).cross(tri[2].position - tri[0].position).z;
            assert!(z > 0.0, "quad triangle must be counter-clockwise");
        }
        let area: f32 = quad
            .chunks_exact(3)
            .map(|t| (t[1].position - t[0].position).cross(t[2].position - t[0].position).z / 2.0)
            .sum();
        assert!((area - 4.0).abs() < 1e-6, "area {area}");
    }

    #[test]
    fn triangle_positions_are_fixed() {
        let positions: Vec<Vec3> = triangle().iter().map(|v| v.position).collect();
        assert_eq!(
            positions,
            vec![
                Vec3::new(0.0, 0.5, 0.0),
                Vec3::new(-0.5, -0.5, 0.0),
                Vec3::new(0.5, -0.5, 0.0)
            ]
        );
    }

    #[test]
    fn vertex_shaders_declare_inputs_matching_their_layouts() {
        let cases = [
            (TRIANGLE_VERTEX_SHADER, VertexFormat::Position),
            (COLOR_VERTEX_SHADER, VertexFormat::PositionColor),
            (TEXTURE_VERTEX_SHADER, VertexFormat::PositionTexCoord),
        ];
        for (source, format) in cases {
            let iface = glsl::scan(source).unwrap();
            iface
                .check_vertex_layout(&VertexLayout::for_format(format))
                .unwrap();
        }
    }

    #[test]
    fn shader_pairs_link() {
        let pairs = [
            (TRIANGLE_VERTEX_SHADER, TRIANGLE_FRAGMENT_SHADER),
            (COLOR_VERTEX_SHADER, COLOR_FRAGMENT_SHADER),
            (TEXTURE_VERTEX_SHADER, TEXTURE_FRAGMENT_SHADER),
        ];
        for (vs, fs) in pairs {
            let vertex = glsl::scan(vs).unwrap();
            let fragment = glsl::scan(fs).unwrap();
            glsl::check_link(&vertex, &fragment).unwrap();
        }
    }
}
