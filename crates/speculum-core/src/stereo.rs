//! Per-eye offsets for stereo reflections.
//!
//! A headset reports, for each eye, the offset from the head center to the
//! eye in head-local space. Reflections are re-projected per eye by moving the
//! viewer position by that offset expressed in world space.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::{ensure_finite, Result};

/// Average human inter-pupillary distance in meters.
pub const DEFAULT_IPD: f32 = 0.063;

/// One eye of a stereo pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Eye {
    /// Left eye.
    Left,
    /// Right eye.
    Right,
}

impl Eye {
    /// Both eyes in submission order.
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    /// Returns the array index of this eye.
    pub const fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    /// Returns display name.
    pub const fn name(self) -> &'static str {
        match self {
            Eye::Left => "left",
            Eye::Right => "right",
        }
    }
}

/// Render parameters for one eye, resolved once per render request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeParameters {
    /// Offset from the head center to the eye, in head-local space.
    pub offset: Vec3,
    /// The eye's native projection matrix.
    pub projection: Mat4,
}

impl EyeParameters {
    /// Creates eye parameters.
    pub fn new(offset: Vec3, projection: Mat4) -> Self {
        Self { offset, projection }
    }

    /// Builds a left/right pair separated by `ipd` along the head's X axis.
    pub fn symmetric(ipd: f32, left_projection: Mat4, right_projection: Mat4) -> [Self; 2] {
        let half = ipd * 0.5;
        [
            Self::new(Vec3::new(-half, 0.0, 0.0), left_projection),
            Self::new(Vec3::new(half, 0.0, 0.0), right_projection),
        ]
    }
}

/// Returns the world-space displacement of `eye` from the head center.
///
/// The z component of the head-local offset is discarded: only lateral and
/// vertical offsets contribute to reflection parallax. Must be evaluated for
/// every render since calibration can change the offsets between frames.
pub fn eye_world_offset(eye: Eye, viewer_rotation: Quat, eyes: &[EyeParameters; 2]) -> Result<Vec3> {
    let local = eyes[eye.index()].offset;
    ensure_finite(local.is_finite(), "eye offset")?;
    ensure_finite(viewer_rotation.is_finite(), "viewer rotation")?;
    Ok(viewer_rotation * Vec3::new(local.x, local.y, 0.0))
}
