//! Stereo mirror demo.
//!
//! Builds a small scene in front of a wall mirror, renders the reflection for
//! a headset viewer with both integration paths on the headless backend and
//! writes the eye textures to PNG files.
//!
//! Run with: cargo run --example stereo_mirror -- [options.json]

use speculum::*;

const OUT_DIR: &str = "stereo_mirror_output";

fn scene() -> Vec<Triangle> {
    let quad = |center: Vec3, half: f32, color: Rgba| {
        let p = |dx: f32, dy: f32| center + Vec3::new(dx, dy, 0.0);
        [
            Triangle::new(p(-half, -half), p(half, -half), p(half, half), color),
            Triangle::new(p(-half, -half), p(half, half), p(-half, half), color),
        ]
    };

    let mut triangles = Vec::new();
    // Back wall behind the viewer, visible in the mirror.
    triangles.extend(quad(Vec3::new(0.0, 1.5, -8.0), 4.0, [70, 80, 110, 255]));
    triangles.extend(quad(Vec3::new(-1.2, 1.2, -3.0), 0.4, [230, 60, 50, 255]));
    triangles.extend(quad(Vec3::new(0.9, 1.8, -4.0), 0.5, [60, 200, 90, 255]));
    // Behind the mirror; the clipped reflection must not show it.
    triangles.extend(quad(Vec3::new(0.0, 1.6, 0.8), 0.3, [250, 250, 250, 255]));
    triangles
}

fn run() -> speculum::Result<()> {
    init();

    let options = match std::env::args().nth(1) {
        Some(path) => MirrorOptions::load(path)?,
        None => MirrorOptions {
            target_size: TargetSizing::Fixed {
                width: 480,
                height: 320,
            },
            stereo: true,
            ..MirrorOptions::default()
        },
    };
    std::fs::create_dir_all(OUT_DIR).map_err(MirrorError::from)?;

    let mut backend = HeadlessBackend::new().with_clear_color([25, 25, 30, 255]);
    backend.set_scene(scene());

    let plane = MirrorPlane::from_transform(Vec3::new(0.0, 1.5, 0.0), Quat::IDENTITY, Vec3::ONE)?;
    let headset = backend.create_camera("headset");
    let pose = Pose::look_to(Vec3::new(0.2, 1.6, -2.5), Vec3::new(-0.05, 0.0, 1.0), Vec3::Y)
        .ok_or_else(|| MirrorError::InvalidViewer("degenerate demo pose".to_string()))?;
    let aspect = 480.0 / 320.0;
    let projection = Mat4::perspective_rh(1.4, aspect, 0.05, 50.0);
    let viewer = ViewerState::perspective(headset, pose, 1.4, aspect, 0.05, 50.0)
        .with_eyes(EyeParameters::symmetric(0.064, projection, projection));

    for integration in [Integration::DrawNotification, Integration::CommandInjection] {
        let options = MirrorOptions {
            integration,
            ..options.clone()
        };
        let mut mirror = Mirror::new(&mut backend, plane, options)?;

        for frame in 1..=3 {
            mirror.begin_frame(FrameIndex(frame));
            let update = mirror.on_camera_will_render(&mut backend, &viewer)?;
            log::info!("frame {frame}: {update:?}");
        }

        let name = match integration {
            Integration::DrawNotification => "draw",
            Integration::CommandInjection => "inject",
        };
        if let Some(injector) = mirror.injector() {
            backend.execute_stage(headset, CameraStage::BeforeImageEffects)?;
            for eye in [None, Some(Eye::Left), Some(Eye::Right)] {
                if let Some(target) = injector.composite_target(eye) {
                    let label = eye.map_or("mono", Eye::name);
                    save_target_png(&backend, target, format!("{OUT_DIR}/{name}_{label}.png"))?;
                }
            }
        } else {
            let reflection = mirror.reflection();
            for eye in [None, Some(Eye::Left), Some(Eye::Right)] {
                if let Some(target) = reflection.target(eye) {
                    let label = eye.map_or("mono", Eye::name);
                    save_target_png(&backend, target.handle, format!("{OUT_DIR}/{name}_{label}.png"))?;
                }
            }
        }
        mirror.release(&mut backend);
    }

    log::info!("wrote reflections to {OUT_DIR}/");
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        eprintln!("stereo_mirror failed: {err}");
        std::process::exit(1);
    }
}
