//! Reflection camera math.
//!
//! The reflection camera is a proper (non mirrored) camera placed where the
//! viewer appears to be when seen through the mirror. Because a proper
//! rotation cannot swap handedness, the image it produces is flipped along its
//! lateral axis by [`oblique_projection`]; that flip also reverses triangle
//! winding, so the render must run with front-face winding inverted.

use glam::{Mat4, Vec3, Vec4};

use crate::camera::{rotation_from_forward_up, Pose, ReflectedState, ViewerState};
use crate::error::{ensure_finite, MirrorError, Result};
use crate::options::MirrorOptions;
use crate::plane::MirrorPlane;
use crate::stereo::{eye_world_offset, Eye};

/// Scale applied by the default projection flip.
pub const DEFAULT_MIRROR_SCALE: Vec3 = Vec3::new(-1.0, 1.0, 1.0);

/// Reflects a viewer pose across the mirror plane.
///
/// The pose is moved into the mirror's local frame, the component along the
/// normal is negated for the position and for the forward and up axes, and
/// the result is moved back to world space. A viewer on the plane keeps its
/// position.
pub fn reflect(viewer: Pose, plane: &MirrorPlane) -> Result<Pose> {
    ensure_finite(viewer.is_finite(), "viewer pose")?;

    let mut position = plane.to_local_point(viewer.position);
    let mut forward = plane.to_local_direction(viewer.forward());
    let mut up = plane.to_local_direction(viewer.up());
    position.z = -position.z;
    forward.z = -forward.z;
    up.z = -up.z;

    let rotation = rotation_from_forward_up(
        plane.to_world_direction(forward),
        plane.to_world_direction(up),
    )
    .ok_or_else(|| MirrorError::InvalidViewer("viewer rotation is not a rotation".to_string()))?;

    Ok(Pose::new(plane.to_world_point(position), rotation))
}

/// Flips a projection along the axes where `mirror_scale` is negative.
///
/// Returns `projection * scale(mirror_scale)`.
pub fn oblique_projection(projection: Mat4, mirror_scale: Vec3) -> Result<Mat4> {
    ensure_finite(projection.is_finite(), "projection")?;
    ensure_finite(mirror_scale.is_finite(), "mirror scale")?;
    if mirror_scale.abs().min_element() < f32::EPSILON {
        return Err(MirrorError::InvalidOptions(
            "mirror scale has a zero component".to_string(),
        ));
    }
    Ok(projection * Mat4::from_scale(mirror_scale))
}

/// Replaces the near plane of a `[0, 1]` depth projection with the mirror plane.
///
/// Geometry between the reflection camera and the mirror would otherwise end
/// up in the reflection. `view` is the world-to-camera matrix of the camera
/// using `projection`. When the camera lies on the plane the projection is
/// returned unchanged.
pub fn clip_projection_to_plane(projection: Mat4, view: Mat4, plane: &MirrorPlane) -> Result<Mat4> {
    ensure_finite(projection.is_finite(), "projection")?;
    ensure_finite(view.is_finite(), "view matrix")?;

    let mut clip = view.inverse().transpose() * plane.equation();
    // The camera sits on the discarded side.
    if clip.w > 0.0 {
        clip = -clip;
    }
    if clip.w.abs() < f32::EPSILON {
        return Ok(projection);
    }

    if projection.determinant().abs() < f32::MIN_POSITIVE {
        return Err(MirrorError::NonFinite("clipped projection"));
    }
    let inverse = projection.inverse();
    let clip_space = inverse.transpose() * clip;
    let corner = inverse * Vec4::new(clip_space.x.signum(), clip_space.y.signum(), 1.0, 1.0);
    let denom = clip.dot(corner);
    if denom.abs() < f32::EPSILON {
        return Ok(projection);
    }
    let row = clip / denom;

    let mut result = projection;
    result.x_axis.z = row.x;
    result.y_axis.z = row.y;
    result.z_axis.z = row.z;
    result.w_axis.z = row.w;
    ensure_finite(result.is_finite(), "clipped projection")?;
    Ok(result)
}

/// Computes the reflected camera state for one render.
///
/// `eye` selects the stereo path: the eye's world offset is applied to the
/// viewer position and the eye's native projection replaces the viewer
/// projection. `None` is the mono path.
pub fn reflected_state(
    viewer: &ViewerState,
    eye: Option<Eye>,
    plane: &MirrorPlane,
    options: &MirrorOptions,
) -> Result<ReflectedState> {
    viewer.validate()?;

    let (pose, base_projection) = match eye {
        Some(eye) => {
            let eyes = viewer.eyes.as_ref().ok_or(MirrorError::MissingEyeParameters)?;
            let offset = eye_world_offset(eye, viewer.pose.rotation, eyes)?;
            let pose = Pose::new(viewer.pose.position + offset, viewer.pose.rotation);
            (pose, eyes[eye.index()].projection)
        }
        None => (viewer.pose, viewer.projection),
    };

    let reflected = reflect(pose, plane)?;
    let mut projection = oblique_projection(base_projection, options.mirror_scale)?;
    if options.clip_to_mirror_plane {
        projection = clip_projection_to_plane(projection, reflected.view_matrix(), plane)?;
    }

    Ok(ReflectedState {
        eye,
        pose: reflected,
        fov: viewer.fov,
        near: viewer.near,
        far: viewer.far,
        projection,
    })
}
