//! Fragment states and the attachment points that live in them.
//!
//! An attachment point is application content fixed in locked space
//! relative to one fragment. While its fragment is not the one being
//! tracked, the content is "unconnected" and should be hidden or frozen by
//! the application. Refits carry attachment points along with the anchors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::anchor::FragmentId;
use crate::pose::Pose;
use crate::solver::RefitResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FragmentState {
    /// No fragment known yet.
    Pending,
    /// Known but not currently tracked.
    Unconnected,
    /// Currently tracked.
    Normal,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttachmentId(pub u64);

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attachment#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPoint {
    pub id: AttachmentId,
    /// `FragmentId::INVALID` until a fragment adopts it.
    pub fragment: FragmentId,
    pub locked_pose: Pose,
}

#[derive(Clone, Debug, Default)]
pub struct FragmentManager {
    states: BTreeMap<FragmentId, FragmentState>,
    attachments: BTreeMap<AttachmentId, AttachmentPoint>,
    current: FragmentId,
    last_id: u64,
}

impl FragmentManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_fragment(&self) -> FragmentId {
        self.current
    }

    pub fn fragment_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, fragment: FragmentId) -> FragmentState {
        self.states
            .get(&fragment)
            .copied()
            .unwrap_or(FragmentState::Pending)
    }

    /// Mark every fragment unconnected, e.g. on tracking loss.
    pub fn pause(&mut self) {
        if self.current.is_valid() {
            debug!(fragment = %self.current, "pausing fragments");
        }
        for state in self.states.values_mut() {
            *state = FragmentState::Unconnected;
        }
        self.current = FragmentId::INVALID;
    }

    /// Make `current` the tracked fragment and adopt unattached points.
    pub fn update(&mut self, current: FragmentId) {
        if !current.is_valid() {
            self.pause();
            return;
        }
        for (id, state) in self.states.iter_mut() {
            *state = if *id == current {
                FragmentState::Normal
            } else {
                FragmentState::Unconnected
            };
        }
        self.states.insert(current, FragmentState::Normal);

        for point in self.attachments.values_mut() {
            if !point.fragment.is_valid() {
                point.fragment = current;
                debug!(id = %point.id, fragment = %current, "attachment point adopted");
            }
        }
        self.current = current;
    }

    /// Move attachment points of absorbed fragments into the merged one.
    pub fn apply_refit(&mut self, refit: &RefitResult) {
        for adjusted in &refit.absorbed {
            for point in self.attachments.values_mut() {
                if point.fragment == adjusted.fragment {
                    point.fragment = refit.merged_fragment;
                    point.locked_pose = adjusted.adjustment * point.locked_pose;
                }
            }
            self.states.remove(&adjusted.fragment);
        }
        let merged = if refit.merged_fragment == self.current {
            FragmentState::Normal
        } else {
            FragmentState::Unconnected
        };
        self.states.insert(refit.merged_fragment, merged);
    }

    /// Attach content at `locked_pose` to the current fragment.
    pub fn create_attachment_point(&mut self, locked_pose: Pose) -> AttachmentId {
        self.last_id += 1;
        let id = AttachmentId(self.last_id);
        self.attachments.insert(
            id,
            AttachmentPoint {
                id,
                fragment: self.current,
                locked_pose,
            },
        );
        id
    }

    pub fn move_attachment_point(&mut self, id: AttachmentId, locked_pose: Pose) -> bool {
        match self.attachments.get_mut(&id) {
            Some(point) => {
                point.locked_pose = locked_pose;
                true
            }
            None => false,
        }
    }

    pub fn remove_attachment_point(&mut self, id: AttachmentId) -> bool {
        self.attachments.remove(&id).is_some()
    }

    pub fn attachment_point(&self, id: AttachmentId) -> Option<&AttachmentPoint> {
        self.attachments.get(&id)
    }

    pub fn attachment_state(&self, id: AttachmentId) -> Option<FragmentState> {
        self.attachments.get(&id).map(|p| self.state(p.fragment))
    }

    pub fn reset(&mut self) {
        self.states.clear();
        self.current = FragmentId::INVALID;
        for point in self.attachments.values_mut() {
            point.fragment = FragmentId::INVALID;
        }
    }
}
