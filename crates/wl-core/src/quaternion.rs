use std::ops::Mul;

use serde::{Deserialize, Serialize};

use crate::constants::{EPSILON, SLERP_THRESHOLD};
use crate::vector::Vec3;

/// Unit quaternion representing a rotation.
///
/// Always normalized. q and -q represent the same rotation; distance and
/// approximate equality account for that.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PartialEq for Quaternion {
    fn eq(&self, other: &Self) -> bool {
        (self.w - other.w).abs() < EPSILON
            && (self.x - other.x).abs() < EPSILON
            && (self.y - other.y).abs() < EPSILON
            && (self.z - other.z).abs() < EPSILON
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl Quaternion {
    /// Create a new quaternion, automatically normalized.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }.normalize()
    }

    /// Identity quaternion (1, 0, 0, 0).
    pub fn identity() -> Self {
        Self {
            w: 1.0,
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Rotation of `angle` radians about `axis`. A degenerate axis yields identity.
    pub fn from_axis_angle(axis: Vec3, angle: f64) -> Self {
        let axis = axis.normalize();
        if axis == Vec3::ZERO {
            return Self::identity();
        }
        let half = angle / 2.0;
        let s = half.sin();
        Self::new(half.cos(), axis.x * s, axis.y * s, axis.z * s)
    }

    /// Rotation about the up (Y) axis.
    pub fn from_yaw(angle: f64) -> Self {
        Self::from_axis_angle(Vec3::UP, angle)
    }

    /// Shortest-arc rotation taking direction `from` onto direction `to`.
    ///
    /// Either vector being near-zero yields identity. Antiparallel inputs
    /// rotate 180° about an arbitrary perpendicular axis.
    pub fn from_to_rotation(from: Vec3, to: Vec3) -> Self {
        let f = from.normalize();
        let t = to.normalize();
        if f == Vec3::ZERO || t == Vec3::ZERO {
            return Self::identity();
        }
        let d = f.dot(t);
        if d >= 1.0 - EPSILON {
            return Self::identity();
        }
        if d <= -1.0 + EPSILON {
            let axis = f.any_perpendicular();
            return Self {
                w: 0.0,
                x: axis.x,
                y: axis.y,
                z: axis.z,
            };
        }
        let c = f.cross(t);
        Self::new(1.0 + d, c.x, c.y, c.z)
    }

    /// Normalize to unit length. Returns identity if near-zero magnitude.
    pub fn normalize(self) -> Self {
        let norm = (self.w * self.w + self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        if norm < EPSILON {
            return Self::identity();
        }
        Self {
            w: self.w / norm,
            x: self.x / norm,
            y: self.y / norm,
            z: self.z / norm,
        }
    }

    /// 4D dot product.
    pub fn dot(self, other: Self) -> f64 {
        self.w * other.w + self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Conjugate, which is the inverse for unit quaternions.
    pub fn inverse(self) -> Self {
        Self {
            w: self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }

    /// Rotate a vector.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    /// Rotation angle in radians, range [0, π].
    pub fn angle(self) -> f64 {
        let v = (self.x * self.x + self.y * self.y + self.z * self.z).sqrt();
        2.0 * v.atan2(self.w.abs())
    }

    /// Angle between the two rotations, range [0, π].
    /// `q` and `-q` are the same rotation.
    pub fn angular_distance(self, other: Self) -> f64 {
        (self.inverse() * other).angle()
    }

    /// True when both represent the same rotation within `tol` radians.
    pub fn approx_eq(self, other: Self, tol: f64) -> bool {
        self.angular_distance(other) <= tol
    }

    /// Spherical linear interpolation with antipodal flip and NLERP fallback.
    pub fn slerp(self, other: Self, t: f64) -> Self {
        if t <= 0.0 {
            return self;
        }
        if t >= 1.0 {
            return other;
        }

        let mut dot = self.dot(other);
        let o;

        // Take shorter arc
        if dot < 0.0 {
            o = -other;
            dot = -dot;
        } else {
            o = other;
        }

        // Near-parallel: NLERP fallback
        if dot > SLERP_THRESHOLD {
            return Self {
                w: self.w + t * (o.w - self.w),
                x: self.x + t * (o.x - self.x),
                y: self.y + t * (o.y - self.y),
                z: self.z + t * (o.z - self.z),
            }
            .normalize();
        }

        let theta = dot.clamp(-1.0, 1.0).acos();
        let sin_theta = theta.sin();

        let s0 = ((1.0 - t) * theta).sin() / sin_theta;
        let s1 = (t * theta).sin() / sin_theta;

        Self {
            w: s0 * self.w + s1 * o.w,
            x: s0 * self.x + s1 * o.x,
            y: s0 * self.y + s1 * o.y,
            z: s0 * self.z + s1 * o.z,
        }
        .normalize()
    }
}

impl std::ops::Neg for Quaternion {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            w: -self.w,
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

/// Hamilton product: `a * b` applies `b` first, then `a`.
impl Mul for Quaternion {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Self {
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        }
    }
}

impl Mul<Vec3> for Quaternion {
    type Output = Vec3;

    fn mul(self, v: Vec3) -> Vec3 {
        self.rotate(v)
    }
}
