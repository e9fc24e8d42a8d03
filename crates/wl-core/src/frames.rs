//! Named coordinate spaces and the pose chain between them.
//!
//! ```text
//! Spongy ──playspace_from_spongy──▶ Playspace ──locked_from_playspace──▶ Locked ──pinned_from_locked──▶ Pinned/Application
//! ```
//!
//! Spongy is raw tracker output. Locked (also called frozen) is drift-corrected
//! by the pose-graph solver. Pinned is locked space further corrected by the
//! user's alignment pins. The application space the renderer uses is the
//! pinned space, reached from playspace through the adjustment pose.

use serde::{Deserialize, Serialize};

use crate::pose::Pose;
use crate::vector::Vec3;

/// One of the named coordinate spaces of the stabilization pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Space {
    Spongy,
    Playspace,
    Locked,
    Pinned,
    Application,
}

impl Space {
    /// Position along the chain, spongy first. Pinned and application coincide.
    fn depth(self) -> u8 {
        match self {
            Self::Spongy => 0,
            Self::Playspace => 1,
            Self::Locked => 2,
            Self::Pinned | Self::Application => 3,
        }
    }
}

/// The pose chain from raw tracker space up to application space.
///
/// Only `adjustment()` is ever written to the live scene; the other poses
/// are either solver/alignment output or app-supplied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameChain {
    /// Solver alignment (frozen from spongy).
    pub locked_from_spongy: Pose,
    /// App-applied transform of the camera rig, e.g. a teleport.
    pub playspace_from_spongy: Pose,
    /// Alignment pin correction.
    pub pinned_from_locked: Pose,
}

impl FrameChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spongy_from_locked(&self) -> Pose {
        self.locked_from_spongy.inverse()
    }

    pub fn spongy_from_playspace(&self) -> Pose {
        self.playspace_from_spongy.inverse()
    }

    pub fn locked_from_playspace(&self) -> Pose {
        self.locked_from_spongy * self.spongy_from_playspace()
    }

    pub fn playspace_from_locked(&self) -> Pose {
        self.locked_from_playspace().inverse()
    }

    pub fn locked_from_pinned(&self) -> Pose {
        self.pinned_from_locked.inverse()
    }

    /// Pose written to the scene anchor node: application from playspace.
    pub fn adjustment(&self) -> Pose {
        self.pinned_from_locked * self.locked_from_playspace()
    }

    /// Full chain: adjustment ∘ locked-from-playspace ∘ playspace-from-spongy.
    pub fn application_from_spongy(&self) -> Pose {
        self.adjustment() * self.playspace_from_spongy
    }

    /// Head pose in locked space given the raw spongy head.
    pub fn locked_head(&self, spongy_head: Pose) -> Pose {
        self.locked_from_playspace() * self.playspace_from_spongy * spongy_head
    }

    /// Transform taking coordinates in `from` to coordinates in `to`.
    pub fn transform(&self, to: Space, from: Space) -> Pose {
        let to_spongy = self.spongy_from(from);
        let from_spongy = self.spongy_from(to).inverse();
        from_spongy * to_spongy
    }

    pub fn convert_pose(&self, pose: Pose, from: Space, to: Space) -> Pose {
        self.transform(to, from) * pose
    }

    pub fn convert_point(&self, p: Vec3, from: Space, to: Space) -> Vec3 {
        self.transform(to, from).transform_point(p)
    }

    /// spongy_from_<space>, built by walking down the chain.
    fn spongy_from(&self, space: Space) -> Pose {
        match space.depth() {
            0 => Pose::identity(),
            1 => self.spongy_from_playspace(),
            2 => self.spongy_from_playspace() * self.playspace_from_locked(),
            _ => {
                self.spongy_from_playspace() * self.playspace_from_locked() * self.locked_from_pinned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quaternion::Quaternion;

    fn chain() -> FrameChain {
        FrameChain {
            locked_from_spongy: Pose::new(Vec3::new(0.2, 0.0, -0.1), Quaternion::from_yaw(0.05)),
            playspace_from_spongy: Pose::new(Vec3::new(3.0, 0.0, 1.0), Quaternion::from_yaw(1.2)),
            pinned_from_locked: Pose::new(Vec3::new(-0.5, 0.1, 0.0), Quaternion::from_yaw(-0.3)),
        }
    }

    #[test]
    fn test_identity_chain() {
        let c = FrameChain::new();
        assert!(c.adjustment().approx_eq(Pose::identity(), 1e-12));
        assert!(c.application_from_spongy().approx_eq(Pose::identity(), 1e-12));
    }

    #[test]
    fn test_application_invariant() {
        let c = chain();
        let expected = c.pinned_from_locked * c.locked_from_playspace() * c.playspace_from_spongy;
        assert!(c.application_from_spongy().approx_eq(expected, 1e-12));
        // And it collapses to pinned ∘ locked_from_spongy
        let collapsed = c.pinned_from_locked * c.locked_from_spongy;
        assert!(c.application_from_spongy().approx_eq(collapsed, 1e-9));
    }

    #[test]
    fn test_locked_head_without_playspace_is_alignment() {
        let mut c = chain();
        c.playspace_from_spongy = Pose::identity();
        let head = Pose::new(Vec3::new(1.0, 1.6, 2.0), Quaternion::from_yaw(0.4));
        assert!(c.locked_head(head).approx_eq(c.locked_from_spongy * head, 1e-12));
    }

    #[test]
    fn test_convert_between_spaces() {
        let c = chain();
        let p = Vec3::new(1.0, 2.0, 3.0);
        let locked = c.convert_point(p, Space::Spongy, Space::Locked);
        assert!(locked.approx_eq(c.locked_from_spongy.transform_point(p), 1e-9));
        let back = c.convert_point(locked, Space::Locked, Space::Spongy);
        assert!(back.approx_eq(p, 1e-9));
        let pinned = c.convert_point(p, Space::Spongy, Space::Pinned);
        let app = c.convert_point(p, Space::Spongy, Space::Application);
        assert!(pinned.approx_eq(app, 1e-12));
    }

    #[test]
    fn test_transform_same_space_is_identity() {
        let c = chain();
        for s in [Space::Spongy, Space::Playspace, Space::Locked, Space::Pinned] {
            assert!(c.transform(s, s).approx_eq(Pose::identity(), 1e-9));
        }
    }
}
