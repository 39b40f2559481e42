//! Rendering side of speculum.
//!
//! This crate turns the reflection math of `speculum-core` into renders:
//! - Backend traits the host renderer implements ([`backend`])
//! - The hidden [`ReflectionCamera`] and its scoped winding inversion
//! - Two integration paths: [`MirrorSurface`] (bind on draw notification)
//!   and [`FrameInjector`] (composite commands on consuming cameras)
//! - A software [`HeadlessBackend`] and a wgpu-based [`WgpuBackend`]

// Rasterizer and texture math casts between pixel and float coordinates
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod error;
pub mod frame_injector;
pub mod headless;
pub mod mirror_surface;
pub mod reflection_camera;
pub mod wgpu_backend;
pub mod winding;

pub use backend::{
    CommandHandle, CommandScheduler, CompositeCommand, MaterialId, MaterialSink, RenderBackend,
    SceneRenderer, TargetAllocator, TargetDescriptor, TextureCopy, TextureHandle,
};
pub use error::{RenderError, RenderResult};
pub use frame_injector::{FrameInjector, InjectOutcome, InjectorState, SkipReason};
pub use headless::{HeadlessBackend, RenderRecord, Rgba, Triangle, MAX_TARGET_DIMENSION};
pub use mirror_surface::{BoundTextures, MaterialBinding, MirrorSurface, SurfaceUpdate, TextureSlots};
pub use reflection_camera::{EyeTarget, ReflectionCamera};
pub use wgpu_backend::{ClearOnly, DrawContext, ReflectionUniforms, SceneDrawer, WgpuBackend};
pub use winding::InvertedWinding;
