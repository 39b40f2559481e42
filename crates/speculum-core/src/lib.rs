//! Core abstractions for speculum.
//!
//! This crate holds everything about planar mirrors that does not touch a GPU:
//! - [`MirrorPlane`] and the reflection math in [`reflection`]
//! - Per-eye offsets for stereo reflections in [`stereo`]
//! - Camera snapshots ([`ViewerState`]) and derived [`ReflectedState`]s
//! - The per-frame [`RenderSchedule`] used for deduplication
//! - [`MirrorOptions`] configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]

pub mod camera;
pub mod error;
pub mod options;
pub mod plane;
pub mod reflection;
pub mod schedule;
pub mod stereo;

pub use camera::{CameraId, CameraStage, FrameIndex, Pose, ReflectedState, ViewerState};
pub use error::{MirrorError, Result};
pub use options::{Integration, MirrorOptions, SlotNames, TargetSizing};
pub use plane::MirrorPlane;
pub use reflection::{clip_projection_to_plane, oblique_projection, reflect, reflected_state};
pub use schedule::RenderSchedule;
pub use stereo::{eye_world_offset, Eye, EyeParameters};

// Re-export glam types for convenience
pub use glam::{Mat4, Quat, UVec2, Vec3, Vec4};
