//! End-to-end runs on the software device.

use glam::Mat4;
use prism_engine_core::device::{ClearMask, DepthFunc, Device, PrimitiveKind};
use prism_engine_core::primitives::{self, TRIANGLE_FRAGMENT_SHADER, TRIANGLE_VERTEX_SHADER};
use prism_engine_core::vertex::pack_vertices;
use prism_engine_core::{
    FramePump, GeometryBuffer, LoopState, Pacing, RenderLoop, SceneConfig, SceneVariant,
    ShaderProgram, SoftwareDevice, StopReason, VertexFormat, VertexLayout,
};

const WIDTH: u32 = 40;
const HEIGHT: u32 = 30;

#[test]
fn unit_quad_with_identity_mvp_covers_whole_viewport() {
    let mut dev = SoftwareDevice::new(WIDTH, HEIGHT);
    dev.clear_color([0.0, 0.0, 0.0, 1.0]);
    dev.enable_depth_test(DepthFunc::Less);
    dev.enable_back_face_culling();

    let mut program =
        ShaderProgram::compile(&mut dev, TRIANGLE_VERTEX_SHADER, TRIANGLE_FRAGMENT_SHADER).unwrap();
    let data = pack_vertices(&primitives::unit_quad(), VertexFormat::Position).unwrap();
    let mut quad = GeometryBuffer::build(
        &mut dev,
        &data,
        VertexLayout::for_format(VertexFormat::Position),
    )
    .unwrap();

    dev.clear(ClearMask::COLOR_AND_DEPTH);
    program.use_program(&mut dev);
    for name in ["uModel", "uView", "uProj"] {
        program.set_mat4(&mut dev, name, &Mat4::IDENTITY);
    }
    program.set_vec3(&mut dev, "uColor", glam::Vec3::ONE);
    quad.bind(&mut dev);
    quad.draw_all(&mut dev, PrimitiveKind::Triangles).unwrap();
    quad.unbind(&mut dev);
    program.unuse(&mut dev);

    assert!(dev.get_error().is_none());
    assert_eq!(
        dev.covered_pixels([0, 0, 0, 255]),
        (WIDTH * HEIGHT) as usize,
        "every pixel of the viewport is covered"
    );

    quad.release(&mut dev);
    program.release(&mut dev);
    assert_eq!(dev.live_objects().total(), 0);
}

#[test]
fn every_variant_runs_and_releases_all_objects() {
    for variant in SceneVariant::ALL {
        let config = SceneConfig {
            width: WIDTH,
            height: HEIGHT,
            ..SceneConfig::for_variant(variant)
        };
        let mut rl = RenderLoop::new(SoftwareDevice::new(WIDTH, HEIGHT), config).unwrap();
        let report = FramePump::new(WIDTH, HEIGHT)
            .with_pacing(Pacing::Fixed(0.05))
            .with_max_frames(12)
            .run(&mut rl)
            .unwrap();

        assert_eq!(report.frames, 12, "{variant}");
        assert_eq!(report.stop, StopReason::FrameLimit);
        assert_eq!(rl.state(), LoopState::Unloaded);
        assert_eq!(rl.frames_rendered(), 12);
        assert_eq!(rl.device().frames_presented(), 12);
        assert_eq!(
            rl.device().live_objects().total(),
            0,
            "{variant} leaked GPU objects"
        );
        assert!((rl.animation_state().elapsed - 0.6).abs() < 1e-9);
    }
}

#[test]
fn resize_mid_run_reallocates_surface_and_keeps_rendering() {
    let config = SceneConfig {
        width: WIDTH,
        height: HEIGHT,
        ..SceneConfig::for_variant(SceneVariant::ColorCube)
    };
    let mut rl = RenderLoop::new(SoftwareDevice::new(WIDTH, HEIGHT), config).unwrap();
    let mut sizes = Vec::new();
    FramePump::new(WIDTH, HEIGHT)
        .with_max_frames(4)
        .run_with(&mut rl, |rl, time, control| {
            sizes.push(rl.device().surface_size());
            if time.frame_index == 1 {
                control.request_resize(20, 60);
            }
        })
        .unwrap();
    assert_eq!(sizes, vec![(40, 30), (40, 30), (20, 60), (20, 60)]);
    assert_eq!(rl.viewport(), (20, 60));
}

#[test]
fn rendered_frames_change_as_the_scene_animates() {
    let config = SceneConfig {
        width: WIDTH,
        height: HEIGHT,
        ..SceneConfig::for_variant(SceneVariant::TexturedCube)
    };
    let mut rl = RenderLoop::new(SoftwareDevice::new(WIDTH, HEIGHT), config).unwrap();
    let mut frames = Vec::new();
    FramePump::new(WIDTH, HEIGHT)
        .with_pacing(Pacing::Fixed(0.2))
        .with_max_frames(3)
        .run_with(&mut rl, |rl, _, _| frames.push(rl.device().front_buffer_rgba()))
        .unwrap();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].len(), (WIDTH * HEIGHT * 4) as usize);
    assert_ne!(frames[0], frames[2], "spinning cube should change the image");
}

#[test]
fn unload_after_load_releases_resources() {
    let mut rl = RenderLoop::new(
        SoftwareDevice::new(8, 8),
        SceneConfig::for_variant(SceneVariant::Triangle),
    )
    .unwrap();
    rl.load().unwrap();
    assert!(rl.device().live_objects().total() > 0);
    rl.unload();
    assert_eq!(rl.device().live_objects().total(), 0);
}
