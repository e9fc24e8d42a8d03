//! Boundary to the device tracking source.
//!
//! The tracker owns raw trackable objects; the engine only ever holds opaque
//! handles to them and asks each frame whether they are located.

use serde::{Deserialize, Serialize};

use crate::anchor::AnchorId;
use crate::pose::Pose;

/// Opaque handle to one raw trackable anchor owned by the tracking source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackableHandle(pub u64);

/// Per-frame state of a raw anchor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatedPose {
    pub located: bool,
    /// Pose in spongy space. Meaningful only when `located`.
    pub pose: Pose,
}

/// Device tracking source: head pose, raw anchors, platform anchor storage.
pub trait TrackingSource {
    /// Whether the device is currently tracking.
    fn is_tracking(&self) -> bool;

    /// Current raw head pose in spongy space.
    fn head_pose(&self) -> Pose;

    /// Create a raw anchor at `pose`. `None` when the platform refuses.
    fn create_anchor(&mut self, pose: Pose) -> Option<TrackableHandle>;

    /// Located flag and pose of a raw anchor. `None` for unknown handles.
    fn anchor_state(&self, handle: TrackableHandle) -> Option<LocatedPose>;

    /// Release a raw anchor.
    fn destroy_anchor(&mut self, handle: TrackableHandle);

    /// Persist a raw anchor in the platform store under `id`.
    fn persist_anchor(&mut self, id: AnchorId, handle: TrackableHandle) -> bool;

    /// Recreate a raw anchor previously persisted under `id`.
    fn restore_anchor(&mut self, id: AnchorId) -> Option<TrackableHandle>;

    /// Drop everything in the platform store.
    fn clear_persisted_anchors(&mut self);

    /// Convenience: located pose or `None`.
    fn located_pose(&self, handle: TrackableHandle) -> Option<Pose> {
        self.anchor_state(handle)
            .filter(|s| s.located)
            .map(|s| s.pose)
    }
}
