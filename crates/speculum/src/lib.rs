//! speculum: planar mirror reflections for mono and stereo renderers.
//!
//! A mirror is a plane with a material. Whenever a camera is about to draw
//! the mirror, a hidden reflection camera renders the scene from the viewer's
//! reflected pose (once per eye for stereo) into an off-screen target, and
//! the target is fed into the mirror's material.
//!
//! # Quick Start
//!
//! ```no_run
//! use speculum::*;
//!
//! fn main() -> speculum::Result<()> {
//!     init();
//!
//!     let mut backend = HeadlessBackend::new();
//!     let plane = MirrorPlane::new(Vec3::ZERO, Vec3::Z)?;
//!     let mut mirror = Mirror::new(&mut backend, plane, MirrorOptions::default())?;
//!
//!     let camera = backend.create_camera("player");
//!     let pose = Pose::look_to(Vec3::new(0.0, 0.0, -5.0), Vec3::Z, Vec3::Y).unwrap();
//!     let viewer = ViewerState::perspective(camera, pose, 1.2, 1.0, 0.1, 100.0);
//!
//!     mirror.begin_frame(FrameIndex(1));
//!     mirror.on_camera_will_render(&mut backend, &viewer)?;
//!     mirror.release(&mut backend);
//!     Ok(())
//! }
//! ```
//!
//! # Integration paths
//!
//! - [`Integration::DrawNotification`]: the reflection target is bound to the
//!   material directly, right before the mirror is drawn.
//! - [`Integration::CommandInjection`]: each consuming camera gets a composite
//!   command that copies the reflection into a target bound to a dynamic
//!   material.

// Facade re-exports everything; lints for re-exported APIs live in the member crates
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

mod export;
mod mirror;

pub use export::{save_rgba_png, save_target_png, target_image};
pub use mirror::{Mirror, MirrorUpdate};

pub use speculum_core::{
    clip_projection_to_plane, eye_world_offset, oblique_projection, reflect, reflected_state,
    CameraId, CameraStage, Eye, EyeParameters, FrameIndex, Integration, Mat4, MirrorError,
    MirrorOptions, MirrorPlane, Pose, Quat, ReflectedState, RenderSchedule, SlotNames,
    TargetSizing, UVec2, Vec3, Vec4, ViewerState,
};
pub use speculum_render::{
    BoundTextures, ClearOnly, CommandHandle, CommandScheduler, CompositeCommand, DrawContext,
    FrameInjector, HeadlessBackend, InjectOutcome, InjectorState, InvertedWinding, MaterialBinding,
    MaterialId, MaterialSink, MirrorSurface, ReflectionCamera, RenderBackend, RenderError,
    RenderRecord, Rgba, SceneDrawer, SceneRenderer, SkipReason, SurfaceUpdate, TargetAllocator,
    TargetDescriptor, TextureCopy, TextureHandle, TextureSlots, Triangle, WgpuBackend,
    MAX_TARGET_DIMENSION,
};

// Hosts drawing through `WgpuBackend` need the matching wgpu version.
pub use wgpu;

use thiserror::Error;

/// Errors surfaced by the facade.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] MirrorError),

    #[error(transparent)]
    Render(#[from] RenderError),

    /// Writing an image failed.
    #[error("image export failed: {0}")]
    Image(#[from] image::ImageError),

    /// The handle does not refer to a live target.
    #[error("unknown render target {0:?}")]
    UnknownTarget(TextureHandle),

    /// Pixel data does not match the given dimensions.
    #[error("invalid image data")]
    InvalidImageData,
}

/// A specialized Result type for speculum operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Initializes logging.
///
/// Safe to call more than once; later calls keep the first logger.
pub fn init() {
    let _ = env_logger::try_init();
    log::info!("speculum initialized");
}

/// Creates a [`WgpuBackend`] on a new surfaceless device, blocking until ready.
pub fn gpu_backend<D: SceneDrawer>(drawer: D) -> Result<WgpuBackend<D>> {
    Ok(pollster::block_on(WgpuBackend::new_headless(drawer))?)
}
