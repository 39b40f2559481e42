//! Mirror plane definition.
//!
//! The mirror plane is the infinite plane coincident with the reflective
//! surface. Its normal is the surface's local +Z axis.

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::error::{ensure_finite, MirrorError, Result};

/// Local axis of the mirror surface that faces out of the glass.
pub const MIRROR_LOCAL_NORMAL: Vec3 = Vec3::Z;

/// Scale components below this magnitude make the mirror transform degenerate.
const MIN_SCALE: f32 = 1e-6;

/// A world-space mirror plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MirrorPlane {
    /// A point on the plane.
    origin: Vec3,
    /// Orientation of the surface; the normal is `rotation * MIRROR_LOCAL_NORMAL`.
    rotation: Quat,
}

impl MirrorPlane {
    /// Creates a plane from the mirror surface's world transform.
    ///
    /// Zero scale on any axis, non-finite components and rotations that
    /// cannot be normalized are rejected.
    pub fn from_transform(position: Vec3, rotation: Quat, scale: Vec3) -> Result<Self> {
        ensure_finite(position.is_finite(), "mirror position")?;
        ensure_finite(rotation.is_finite(), "mirror rotation")?;
        ensure_finite(scale.is_finite(), "mirror scale")?;
        if scale.abs().min_element() < MIN_SCALE || rotation.length() < MIN_SCALE {
            return Err(MirrorError::DegeneratePlane);
        }
        Ok(Self {
            origin: position,
            rotation: rotation.normalize(),
        })
    }

    /// Creates a plane through `origin` facing `normal`.
    pub fn new(origin: Vec3, normal: Vec3) -> Result<Self> {
        ensure_finite(origin.is_finite(), "mirror position")?;
        ensure_finite(normal.is_finite(), "mirror normal")?;
        let normal = normal.normalize_or_zero();
        if normal == Vec3::ZERO {
            return Err(MirrorError::DegeneratePlane);
        }
        Ok(Self {
            origin,
            rotation: Quat::from_rotation_arc(MIRROR_LOCAL_NORMAL, normal),
        })
    }

    /// Returns the origin point of the plane.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Returns the orientation of the mirror surface.
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Returns the unit normal of the plane.
    pub fn normal(&self) -> Vec3 {
        self.rotation * MIRROR_LOCAL_NORMAL
    }

    /// Returns the signed distance from a point to the plane.
    ///
    /// Positive values lie on the side the normal points to.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.origin).dot(self.normal())
    }

    /// Projects a point onto the plane.
    pub fn project(&self, point: Vec3) -> Vec3 {
        point - self.signed_distance(point) * self.normal()
    }

    /// Reflects a point across the plane.
    pub fn reflect_point(&self, point: Vec3) -> Vec3 {
        point - 2.0 * self.signed_distance(point) * self.normal()
    }

    /// Reflects a direction across the plane.
    pub fn reflect_direction(&self, direction: Vec3) -> Vec3 {
        let n = self.normal();
        direction - 2.0 * direction.dot(n) * n
    }

    /// Expresses a world-space point in the mirror's local frame.
    pub fn to_local_point(&self, point: Vec3) -> Vec3 {
        self.rotation.inverse() * (point - self.origin)
    }

    /// Expresses a mirror-local point in world space.
    pub fn to_world_point(&self, point: Vec3) -> Vec3 {
        self.rotation * point + self.origin
    }

    /// Expresses a world-space direction in the mirror's local frame.
    pub fn to_local_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation.inverse() * direction
    }

    /// Expresses a mirror-local direction in world space.
    pub fn to_world_direction(&self, direction: Vec3) -> Vec3 {
        self.rotation * direction
    }

    /// Returns the plane as `(n, d)` with `n . p + d = 0` for points on it.
    pub fn equation(&self) -> Vec4 {
        let n = self.normal();
        n.extend(-self.origin.dot(n))
    }

    /// Computes the matrix reflecting points across this plane.
    pub fn reflection_matrix(&self) -> Mat4 {
        let n = self.normal();
        let d = -self.origin.dot(n);

        // | 1-2nx²   -2nxny   -2nxnz   -2nxd |
        // | -2nxny   1-2ny²   -2nynz   -2nyd |
        // | -2nxnz   -2nynz   1-2nz²   -2nzd |
        // |    0        0        0       1   |
        Mat4::from_cols(
            Vec4::new(1.0 - 2.0 * n.x * n.x, -2.0 * n.x * n.y, -2.0 * n.x * n.z, 0.0),
            Vec4::new(-2.0 * n.x * n.y, 1.0 - 2.0 * n.y * n.y, -2.0 * n.y * n.z, 0.0),
            Vec4::new(-2.0 * n.x * n.z, -2.0 * n.y * n.z, 1.0 - 2.0 * n.z * n.z, 0.0),
            Vec4::new(-2.0 * n.x * d, -2.0 * n.y * d, -2.0 * n.z * d, 1.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_from_normal() {
        let plane = MirrorPlane::new(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 2.0, 0.0)).unwrap();
        assert!((plane.normal() - Vec3::Y).length() < 1e-6);
        assert_eq!(plane.origin(), Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_from_transform_uses_local_forward() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let plane = MirrorPlane::from_transform(Vec3::ZERO, rotation, Vec3::ONE).unwrap();
        assert!((plane.normal() - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_degenerate_transforms_rejected() {
        assert!(matches!(
            MirrorPlane::from_transform(Vec3::ZERO, Quat::IDENTITY, Vec3::new(1.0, 0.0, 1.0)),
            Err(MirrorError::DegeneratePlane)
        ));
        assert!(matches!(
            MirrorPlane::from_transform(Vec3::ZERO, Quat::from_xyzw(0.0, 0.0, 0.0, 0.0), Vec3::ONE),
            Err(MirrorError::DegeneratePlane)
        ));
        assert!(matches!(
            MirrorPlane::new(Vec3::ZERO, Vec3::ZERO),
            Err(MirrorError::DegeneratePlane)
        ));
        assert!(matches!(
            MirrorPlane::new(Vec3::new(f32::NAN, 0.0, 0.0), Vec3::Z),
            Err(MirrorError::NonFinite(_))
        ));
    }

    #[test]
    fn test_signed_distance_and_project() {
        let plane = MirrorPlane::new(Vec3::ZERO, Vec3::Z).unwrap();
        assert!((plane.signed_distance(Vec3::new(3.0, 1.0, 2.0)) - 2.0).abs() < 1e-6);
        assert!((plane.signed_distance(Vec3::new(0.0, 0.0, -4.0)) + 4.0).abs() < 1e-6);
        let projected = plane.project(Vec3::new(1.0, 5.0, 2.0));
        assert!((projected - Vec3::new(1.0, 5.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_reflection_matrix_matches_reflect_point() {
        let plane = MirrorPlane::new(Vec3::new(0.5, -1.0, 2.0), Vec3::new(1.0, 1.0, 0.3)).unwrap();
        let mat = plane.reflection_matrix();
        let point = Vec3::new(1.0, 2.0, 3.0);
        let reflected = mat.transform_point3(point);
        assert!((reflected - plane.reflect_point(point)).length() < 1e-4);
    }

    #[test]
    fn test_reflection_is_involution() {
        let plane = MirrorPlane::new(Vec3::new(0.0, 1.0, 0.0), Vec3::Y).unwrap();
        let double = plane.reflection_matrix() * plane.reflection_matrix();

        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((double.col(j)[i] - expected).abs() < 0.001);
            }
        }
    }

    #[test]
    fn test_local_frame_round_trip() {
        let plane = MirrorPlane::from_transform(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_rotation_x(0.4),
            Vec3::splat(2.0),
        )
        .unwrap();
        let point = Vec3::new(-2.0, 0.5, 7.0);
        let local = plane.to_local_point(point);
        assert!((plane.to_world_point(local) - point).length() < 1e-5);
        assert!((local.z - plane.signed_distance(point)).abs() < 1e-5);
    }
}
