//! Camera identities, poses and per-render camera snapshots.

use glam::{Mat3, Mat4, Quat, UVec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, MirrorError, Result};
use crate::stereo::{Eye, EyeParameters};

/// Opaque identity of a camera known to the host renderer.
///
/// Identity comparison is all the core ever does with it; in particular the
/// reflection camera compares incoming viewers against its own hidden camera
/// to avoid rendering itself recursively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(u64);

impl CameraId {
    /// Wraps a host-side camera identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Host frame counter used by render schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Returns the following frame.
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Point in a consuming camera's frame where an attached command runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CameraStage {
    /// After the skybox has been drawn.
    AfterSkybox,
    /// After all opaque geometry has been drawn.
    AfterOpaque,
    /// Right before image effects and post-processing.
    #[default]
    BeforeImageEffects,
}

/// A rigid camera pose.
///
/// Cameras look down their local -Z axis with +Y up, matching
/// `Mat4::look_at_rh`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// World-space position.
    pub position: Vec3,
    /// World-space orientation.
    pub rotation: Quat,
}

impl Pose {
    /// Pose at the origin looking down -Z.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    /// Creates a pose from a position and rotation.
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Creates a pose at `position` looking along `forward` with the given up hint.
    ///
    /// Returns `None` when `forward` is zero or parallel to `up`.
    pub fn look_to(position: Vec3, forward: Vec3, up: Vec3) -> Option<Self> {
        rotation_from_forward_up(forward, up).map(|rotation| Self { position, rotation })
    }

    /// Returns the direction the camera looks at.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Returns the camera's up direction.
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Returns the camera's right direction.
    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Returns the world-to-camera matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// Returns whether both position and rotation are finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.rotation.is_finite()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Builds a proper rotation whose -Z axis is `forward` and whose +Y axis is
/// `up` orthogonalized against it.
pub fn rotation_from_forward_up(forward: Vec3, up: Vec3) -> Option<Quat> {
    let back = -forward.normalize_or_zero();
    if back == Vec3::ZERO {
        return None;
    }
    let right = up.cross(back).normalize_or_zero();
    if right == Vec3::ZERO {
        return None;
    }
    let true_up = back.cross(right);
    Some(Quat::from_mat3(&Mat3::from_cols(right, true_up, back)).normalize())
}

/// Snapshot of the camera currently being satisfied.
///
/// Supplied fresh for every render request and never cached beyond it.
#[derive(Debug, Clone)]
pub struct ViewerState {
    /// Identity of the consuming camera.
    pub camera: CameraId,
    /// Camera pose (head pose for a headset).
    pub pose: Pose,
    /// Vertical field of view in radians.
    pub fov: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Projection matrix of the viewer.
    pub projection: Mat4,
    /// Per-eye offsets and projections, for stereo renders.
    pub eyes: Option<[EyeParameters; 2]>,
    /// Render size recommended by the headset or window, if any.
    pub recommended_size: Option<UVec2>,
}

impl ViewerState {
    /// Creates a mono viewer with a right-handed `[0, 1]` depth perspective projection.
    pub fn perspective(camera: CameraId, pose: Pose, fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            camera,
            pose,
            fov,
            near,
            far,
            projection: Mat4::perspective_rh(fov, aspect, near, far),
            eyes: None,
            recommended_size: None,
        }
    }

    /// Attaches per-eye parameters.
    #[must_use]
    pub fn with_eyes(mut self, eyes: [EyeParameters; 2]) -> Self {
        self.eyes = Some(eyes);
        self
    }

    /// Attaches a recommended render size.
    #[must_use]
    pub fn with_recommended_size(mut self, width: u32, height: u32) -> Self {
        self.recommended_size = Some(UVec2::new(width, height));
        self
    }

    /// Returns the parameters of one eye.
    pub fn eye(&self, eye: Eye) -> Result<&EyeParameters> {
        self.eyes
            .as_ref()
            .map(|eyes| &eyes[eye.index()])
            .ok_or(MirrorError::MissingEyeParameters)
    }

    /// Rejects snapshots that cannot produce a meaningful reflection.
    pub fn validate(&self) -> Result<()> {
        ensure_finite(self.pose.is_finite(), "viewer pose")?;
        ensure_finite(self.projection.is_finite(), "viewer projection")?;
        ensure_finite(
            self.fov.is_finite() && self.near.is_finite() && self.far.is_finite(),
            "viewer clip parameters",
        )?;
        if self.fov <= 0.0 || self.fov >= std::f32::consts::PI {
            return Err(MirrorError::InvalidViewer(format!(
                "field of view {} outside (0, pi)",
                self.fov
            )));
        }
        if self.near <= 0.0 || self.far <= self.near {
            return Err(MirrorError::InvalidViewer(format!(
                "clip range [{}, {}] is empty",
                self.near, self.far
            )));
        }
        if let Some(size) = self.recommended_size {
            if size.x == 0 || size.y == 0 {
                return Err(MirrorError::InvalidViewer(
                    "recommended size has a zero dimension".to_string(),
                ));
            }
        }
        if let Some(eyes) = &self.eyes {
            for params in eyes {
                ensure_finite(params.offset.is_finite(), "eye offset")?;
                ensure_finite(params.projection.is_finite(), "eye projection")?;
            }
        }
        Ok(())
    }
}

/// Pose and projection of the hidden reflection camera for one render.
///
/// Recomputed for every render; a stale value is a correctness bug.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectedState {
    /// Eye this state was computed for, `None` for mono renders.
    pub eye: Option<Eye>,
    /// Reflected camera pose.
    pub pose: Pose,
    /// Vertical field of view copied from the viewer.
    pub fov: f32,
    /// Near plane copied from the viewer.
    pub near: f32,
    /// Far plane copied from the viewer.
    pub far: f32,
    /// Flipped (and optionally plane-clipped) projection.
    pub projection: Mat4,
}

impl ReflectedState {
    /// Returns the world-to-camera matrix of the reflected pose.
    pub fn view_matrix(&self) -> Mat4 {
        self.pose.view_matrix()
    }

    /// Returns the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection * self.view_matrix()
    }
}
