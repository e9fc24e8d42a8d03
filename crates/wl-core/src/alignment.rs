//! Alignment anchors (pins) and the pinned-from-locked correction.
//!
//! Applications edit a pending set of pins; `send_alignment_anchors`
//! commits it and re-runs the orienter per fragment. Every frame the
//! committed pins are blended around the locked head pose into one
//! `pinned_from_locked` pose.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::anchor::{AlignmentId, FragmentId};
use crate::constants::EPSILON;
use crate::orientation::{
    AlignmentContext, Correspondence, Orienter, OrienterConfig, TripleOrienter, WeightedRotation,
};
use crate::pose::Pose;
use crate::quaternion::Quaternion;
use crate::solver::RefitResult;
use crate::vector::Vec3;

/// One model↔locked correspondence.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignmentAnchor {
    pub id: AlignmentId,
    pub name: String,
    /// Authored pose of the content in model (pinned) space.
    pub model_pose: Pose,
    /// Where that content belongs in locked space.
    pub locked_pose: Pose,
    /// Fragment that was active when the pin was placed.
    pub fragment: FragmentId,
    /// Locked-from-model rotation computed by the orienter.
    pub rotation: Quaternion,
}

impl AlignmentAnchor {
    /// This pin's own pinned-from-locked correction.
    pub fn pinned_from_locked(&self) -> Pose {
        let locked = Pose::new(
            self.locked_pose.position,
            self.rotation * self.model_pose.rotation,
        );
        self.model_pose * locked.inverse()
    }

    fn correspondence(&self) -> Correspondence {
        Correspondence {
            id: self.id,
            model_position: self.model_pose.position,
            locked_position: self.locked_pose.position,
        }
    }
}

/// Persisted form of one pin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SavedPin {
    pub name: String,
    #[serde(default)]
    pub fragment: FragmentId,
    pub model_pose: Pose,
    pub locked_pose: Pose,
}

/// The alignment record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSnapshot {
    #[serde(default)]
    pub pins: Vec<SavedPin>,
}

/// Committed pins, as handed to the orienter.
#[derive(Clone, Debug, Default)]
struct PinSet {
    pins: Vec<AlignmentAnchor>,
}

impl AlignmentContext for PinSet {
    fn correspondences(&self, fragment: FragmentId) -> Vec<Correspondence> {
        self.pins
            .iter()
            .filter(|p| p.fragment == fragment)
            .map(AlignmentAnchor::correspondence)
            .collect()
    }

    fn set_rotation(&mut self, id: AlignmentId, rotation: Quaternion) {
        if let Some(pin) = self.pins.iter_mut().find(|p| p.id == id) {
            pin.rotation = rotation;
        }
    }
}

pub struct AlignmentManager {
    orienter: Box<dyn Orienter + Send + Sync>,
    pending: Vec<AlignmentAnchor>,
    active: PinSet,
    active_fragment: FragmentId,
    last_id: AlignmentId,
}

impl Default for AlignmentManager {
    fn default() -> Self {
        Self::with_config(OrienterConfig::default())
    }
}

impl AlignmentManager {
    pub fn new(orienter: Box<dyn Orienter + Send + Sync>) -> Self {
        Self {
            orienter,
            pending: Vec::new(),
            active: PinSet::default(),
            active_fragment: FragmentId::INVALID,
            last_id: AlignmentId::INVALID,
        }
    }

    /// Manager using the three-body orienter with `config`.
    pub fn with_config(config: OrienterConfig) -> Self {
        Self::new(Box::new(TripleOrienter::new(config)))
    }

    /// Swap the orienter and recompute committed rotations with it.
    pub fn set_orienter(&mut self, orienter: Box<dyn Orienter + Send + Sync>) {
        self.orienter = orienter;
        self.reorient_all();
    }

    /// Fragment that new pins are attached to and that is preferred when blending.
    pub fn set_active_fragment(&mut self, fragment: FragmentId) {
        self.active_fragment = fragment;
    }

    pub fn active_fragment(&self) -> FragmentId {
        self.active_fragment
    }

    /// Committed pins.
    pub fn anchors(&self) -> &[AlignmentAnchor] {
        &self.active.pins
    }

    pub fn pending(&self) -> &[AlignmentAnchor] {
        &self.pending
    }

    /// Add a pin to the pending set. A pending pin with the same name is
    /// repositioned in place and keeps its id.
    pub fn add_alignment_anchor(
        &mut self,
        name: &str,
        model_pose: Pose,
        locked_pose: Pose,
    ) -> AlignmentId {
        let fragment = self.active_fragment;
        if let Some(pin) = self.pending.iter_mut().find(|p| p.name == name) {
            pin.model_pose = model_pose;
            pin.locked_pose = locked_pose;
            pin.fragment = fragment;
            return pin.id;
        }

        self.last_id = self.last_id.next();
        self.pending.push(AlignmentAnchor {
            id: self.last_id,
            name: name.to_string(),
            model_pose,
            locked_pose,
            fragment,
            rotation: Quaternion::identity(),
        });
        self.last_id
    }

    pub fn remove_alignment_anchor(&mut self, id: AlignmentId) -> bool {
        let before = self.pending.len();
        self.pending.retain(|p| p.id != id);
        self.pending.len() != before
    }

    pub fn clear_alignment_anchors(&mut self) {
        self.pending.clear();
    }

    /// Commit the pending set and recompute rotations for every fragment.
    pub fn send_alignment_anchors(&mut self) {
        self.active.pins = self.pending.clone();
        self.reorient_all();
        debug!(pins = self.active.pins.len(), "committed alignment anchors");
    }

    fn reorient_all(&mut self) {
        let mut fragments: Vec<FragmentId> = self.active.pins.iter().map(|p| p.fragment).collect();
        fragments.sort();
        fragments.dedup();
        for fragment in fragments {
            self.orienter.reorient(fragment, &mut self.active);
        }
    }

    /// Blend the committed pins around `locked_head` into pinned-from-locked.
    pub fn compute_pinned_pose(&self, locked_head: Pose) -> Pose {
        let in_fragment: Vec<&AlignmentAnchor> = self
            .active
            .pins
            .iter()
            .filter(|p| p.fragment == self.active_fragment)
            .collect();
        let pins = if in_fragment.is_empty() {
            self.active.pins.iter().collect()
        } else {
            in_fragment
        };

        let head = locked_head.position;
        match pins.as_slice() {
            [] => Pose::identity(),
            [only] => only.pinned_from_locked(),
            [a, b] => blend_segment(a, b, head),
            _ => blend_inverse_square(&pins, head),
        }
    }

    /// Carry pins of absorbed fragments into the merged fragment.
    pub fn apply_refit(&mut self, refit: &RefitResult) {
        for adjusted in &refit.absorbed {
            for pin in self.pending.iter_mut().chain(self.active.pins.iter_mut()) {
                if pin.fragment == adjusted.fragment {
                    pin.fragment = refit.merged_fragment;
                    pin.locked_pose = adjusted.adjustment * pin.locked_pose;
                }
            }
        }
        self.reorient_all();
    }

    pub fn save(&self) -> AlignmentSnapshot {
        AlignmentSnapshot {
            pins: self
                .active
                .pins
                .iter()
                .map(|p| SavedPin {
                    name: p.name.clone(),
                    fragment: p.fragment,
                    model_pose: p.model_pose,
                    locked_pose: p.locked_pose,
                })
                .collect(),
        }
    }

    /// Replace all pins with a saved record and commit them.
    pub fn load(&mut self, snapshot: &AlignmentSnapshot) {
        self.pending.clear();
        for saved in &snapshot.pins {
            self.last_id = self.last_id.next();
            self.pending.push(AlignmentAnchor {
                id: self.last_id,
                name: saved.name.clone(),
                model_pose: saved.model_pose,
                locked_pose: saved.locked_pose,
                fragment: saved.fragment,
                rotation: Quaternion::identity(),
            });
        }
        self.send_alignment_anchors();
        info!(pins = snapshot.pins.len(), "loaded alignment anchors");
    }

    /// Re-attach a loaded pin to the application's current model pose.
    ///
    /// Returns `None` when no loaded pin carries `name`. Takes effect on the
    /// next send.
    pub fn restore_alignment_anchor(&mut self, name: &str, model_pose: Pose) -> Option<AlignmentId> {
        let pin = self.pending.iter_mut().find(|p| p.name == name)?;
        pin.model_pose = model_pose;
        Some(pin.id)
    }

    pub fn reset(&mut self) {
        self.pending.clear();
        self.active.pins.clear();
    }
}

/// Two pins: interpolate by the head's projection onto the segment between them.
fn blend_segment(a: &AlignmentAnchor, b: &AlignmentAnchor, head: Vec3) -> Pose {
    let pa = a.locked_pose.position.horizontal();
    let pb = b.locked_pose.position.horizontal();
    let seg = pb - pa;
    let len_sq = seg.length_squared();
    let t = if len_sq < EPSILON {
        0.5
    } else {
        ((head.horizontal() - pa).dot(seg) / len_sq).clamp(0.0, 1.0)
    };
    a.pinned_from_locked().interpolate(b.pinned_from_locked(), t)
}

/// Three or more pins: inverse-square horizontal distance weights.
fn blend_inverse_square(pins: &[&AlignmentAnchor], head: Vec3) -> Pose {
    let head = head.horizontal();
    let mut position = Vec3::ZERO;
    let mut rotation = WeightedRotation::default();

    for pin in pins {
        let pose = pin.pinned_from_locked();
        let dist_sq = pin.locked_pose.position.horizontal().distance_squared(head);
        if dist_sq < EPSILON {
            return pose;
        }
        let weight = 1.0 / dist_sq;
        position += pose.position * weight;
        rotation.add(pose.rotation, weight);
    }
    Pose::new(position * (1.0 / rotation.weight), rotation.rotation)
}
