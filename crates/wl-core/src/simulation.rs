//! Deterministic tracking source for tests, benches and the CLI.
//!
//! Holds a ground-truth world. Everything it reports passes through a drift
//! pose (spongy from world), so drift can be injected and the engine's
//! ability to cancel it measured.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::anchor::AnchorId;
use crate::pose::Pose;
use crate::quaternion::Quaternion;
use crate::tracking::{LocatedPose, TrackableHandle, TrackingSource};
use crate::vector::Vec3;

/// Anchors persisted by the simulated platform, in world space.
///
/// Survives simulated session restarts and can itself be saved to disk.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformAnchorStore {
    #[serde(default)]
    pub anchors: BTreeMap<AnchorId, Pose>,
}

impl PlatformAnchorStore {
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct SimulatedTracker {
    tracking: bool,
    head_world: Pose,
    /// spongy_from_world
    drift: Pose,
    live: BTreeMap<TrackableHandle, Pose>,
    failing: BTreeSet<TrackableHandle>,
    store: PlatformAnchorStore,
    next_handle: u64,
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTracker {
    pub fn new() -> Self {
        Self {
            tracking: true,
            head_world: Pose::identity(),
            drift: Pose::identity(),
            live: BTreeMap::new(),
            failing: BTreeSet::new(),
            store: PlatformAnchorStore::default(),
            next_handle: 1,
        }
    }

    pub fn with_store(mut self, store: PlatformAnchorStore) -> Self {
        self.store = store;
        self
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    /// Head pose in ground-truth world space.
    pub fn set_head(&mut self, head_world: Pose) {
        self.head_world = head_world;
    }

    pub fn head_world(&self) -> Pose {
        self.head_world
    }

    pub fn drift(&self) -> Pose {
        self.drift
    }

    pub fn set_drift(&mut self, spongy_from_world: Pose) {
        self.drift = spongy_from_world;
    }

    /// Random-walk the drift by up to `meters` and `radians` of yaw.
    pub fn drift_step(&mut self, rng: &mut impl Rng, meters: f64, radians: f64) {
        let offset = Vec3::new(
            rng.random_range(-meters..=meters),
            0.0,
            rng.random_range(-meters..=meters),
        );
        let yaw = Quaternion::from_yaw(rng.random_range(-radians..=radians));
        self.drift = Pose::new(offset, yaw) * self.drift;
    }

    /// Keep reporting `handle` as not located until `recover_locate`.
    pub fn fail_locate(&mut self, handle: TrackableHandle) {
        self.failing.insert(handle);
    }

    pub fn recover_locate(&mut self, handle: TrackableHandle) {
        self.failing.remove(&handle);
    }

    pub fn live_anchor_count(&self) -> usize {
        self.live.len()
    }

    pub fn platform_store(&self) -> &PlatformAnchorStore {
        &self.store
    }

    /// Drop one anchor from the platform store, as if the platform lost it.
    pub fn forget_persisted(&mut self, id: AnchorId) {
        self.store.anchors.remove(&id);
    }

    /// Start a new tracking session: live anchors vanish, drift changes,
    /// the platform store stays.
    pub fn restart_session(&mut self, drift: Pose) {
        self.live.clear();
        self.failing.clear();
        self.drift = drift;
        self.tracking = true;
    }

    /// Ground-truth world pose of a live anchor.
    pub fn world_pose(&self, handle: TrackableHandle) -> Option<Pose> {
        self.live.get(&handle).copied()
    }

    fn spawn(&mut self, world: Pose) -> TrackableHandle {
        let handle = TrackableHandle(self.next_handle);
        self.next_handle += 1;
        self.live.insert(handle, world);
        handle
    }
}

impl TrackingSource for SimulatedTracker {
    fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn head_pose(&self) -> Pose {
        self.drift * self.head_world
    }

    fn create_anchor(&mut self, pose: Pose) -> Option<TrackableHandle> {
        if !self.tracking {
            return None;
        }
        let world = self.drift.inverse() * pose;
        Some(self.spawn(world))
    }

    fn anchor_state(&self, handle: TrackableHandle) -> Option<LocatedPose> {
        let world = self.live.get(&handle)?;
        Some(LocatedPose {
            located: self.tracking && !self.failing.contains(&handle),
            pose: self.drift * *world,
        })
    }

    fn destroy_anchor(&mut self, handle: TrackableHandle) {
        self.live.remove(&handle);
        self.failing.remove(&handle);
    }

    fn persist_anchor(&mut self, id: AnchorId, handle: TrackableHandle) -> bool {
        match self.live.get(&handle) {
            Some(world) => {
                self.store.anchors.insert(id, *world);
                true
            }
            None => false,
        }
    }

    fn restore_anchor(&mut self, id: AnchorId) -> Option<TrackableHandle> {
        let world = self.store.anchors.get(&id).copied()?;
        Some(self.spawn(world))
    }

    fn clear_persisted_anchors(&mut self) {
        self.store.anchors.clear();
    }
}
