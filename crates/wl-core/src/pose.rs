use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::quaternion::Quaternion;
use crate::vector::Vec3;

/// Rigid transform: rotation followed by translation.
///
/// Poses are named `a_from_b`: they take coordinates expressed in space `b`
/// into space `a`. Composition chains left to right in name order,
/// `a_from_b * b_from_c == a_from_c`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quaternion,
}

impl Pose {
    pub fn new(position: Vec3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quaternion::identity(),
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quaternion::identity())
    }

    pub fn from_rotation(rotation: Quaternion) -> Self {
        Self::new(Vec3::ZERO, rotation)
    }

    pub fn inverse(self) -> Self {
        let inv = self.rotation.inverse();
        Self {
            position: -inv.rotate(self.position),
            rotation: inv,
        }
    }

    pub fn transform_point(self, p: Vec3) -> Vec3 {
        self.rotation.rotate(p) + self.position
    }

    pub fn transform_direction(self, d: Vec3) -> Vec3 {
        self.rotation.rotate(d)
    }

    /// Blend toward `other`: positions lerp, rotations slerp.
    pub fn interpolate(self, other: Self, t: f64) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            rotation: self.rotation.slerp(other.rotation, t),
        }
    }

    /// Position within `tol` meters and rotation within `tol` radians.
    pub fn approx_eq(self, other: Self, tol: f64) -> bool {
        self.position.approx_eq(other.position, tol) && self.rotation.approx_eq(other.rotation, tol)
    }
}

impl Mul for Pose {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            position: self.transform_point(rhs.position),
            rotation: (self.rotation * rhs.rotation).normalize(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn sample() -> Pose {
        Pose::new(
            Vec3::new(1.0, 2.0, -0.5),
            Quaternion::from_axis_angle(Vec3::new(0.2, 1.0, 0.1), 0.8),
        )
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let p = sample();
        assert!((p * p.inverse()).approx_eq(Pose::identity(), 1e-9));
        assert!((p.inverse() * p).approx_eq(Pose::identity(), 1e-9));
    }

    #[test]
    fn test_composition_order() {
        let a_from_b = Pose::from_position(Vec3::new(1.0, 0.0, 0.0));
        let b_from_c = Pose::from_rotation(Quaternion::from_yaw(FRAC_PI_2));
        let a_from_c = a_from_b * b_from_c;
        // c's +Z rotates to +X in b, then shifts by +1 X in a
        let p = a_from_c.transform_point(Vec3::FORWARD);
        assert!(p.approx_eq(Vec3::new(2.0, 0.0, 0.0), 1e-12));
    }

    #[test]
    fn test_transform_point_matches_composition() {
        let a = sample();
        let b = Pose::new(Vec3::new(-3.0, 0.5, 0.0), Quaternion::from_yaw(-0.4));
        let v = Vec3::new(0.1, 0.2, 0.3);
        let direct = a.transform_point(b.transform_point(v));
        assert!((a * b).transform_point(v).approx_eq(direct, 1e-12));
    }

    #[test]
    fn test_interpolate_midpoint() {
        let a = Pose::identity();
        let b = Pose::new(Vec3::new(2.0, 0.0, 0.0), Quaternion::from_yaw(1.0));
        let mid = a.interpolate(b, 0.5);
        assert!(mid.approx_eq(
            Pose::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::from_yaw(0.5)),
            1e-9
        ));
    }

    #[test]
    fn test_transform_direction_ignores_translation() {
        let p = Pose::new(Vec3::new(5.0, -2.0, 1.0), Quaternion::from_yaw(FRAC_PI_2));
        let d = p.transform_direction(Vec3::FORWARD);
        assert!(d.approx_eq(Vec3::RIGHT, 1e-12));
        let moved = p.transform_point(Vec3::FORWARD) - p.transform_point(Vec3::ZERO);
        assert!(moved.approx_eq(d, 1e-12));
    }
}
