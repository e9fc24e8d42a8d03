//! Minimal in-process pose-graph solver.
//!
//! Anchors are frozen into locked space the first time they are reported,
//! using the alignment of that moment. The alignment each frame is whatever
//! makes the most significant anchor sit exactly on its frozen pose.
//! Fragments are connected components over reported edges.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::anchor::{AnchorId, AnchorPose, Edge, FragmentId, FrozenAnchor};
use crate::constants::REFREEZE_DEVIATION;
use crate::pose::Pose;
use crate::solver::{
    FragmentAdjustment, Include, PoseGraphSolver, RefitResult, SolverMetrics, SolverSnapshot,
};

#[derive(Clone, Debug)]
pub struct LockingSolver {
    spongy: BTreeMap<AnchorId, Pose>,
    spongy_head: Pose,
    most_significant: AnchorId,
    frozen: BTreeMap<AnchorId, FrozenAnchor>,
    edges: BTreeSet<Edge>,
    alignment: Pose,
    next_fragment: u64,
    merge_indicated: bool,
    refreeze_indicated: bool,
    refreeze_deviation: f64,
}

impl Default for LockingSolver {
    fn default() -> Self {
        Self::new()
    }
}

impl LockingSolver {
    pub fn new() -> Self {
        Self {
            spongy: BTreeMap::new(),
            spongy_head: Pose::identity(),
            most_significant: AnchorId::INVALID,
            frozen: BTreeMap::new(),
            edges: BTreeSet::new(),
            alignment: Pose::identity(),
            next_fragment: 1,
            merge_indicated: false,
            refreeze_indicated: false,
            refreeze_deviation: REFREEZE_DEVIATION,
        }
    }

    /// Override the disagreement (meters) at which a refreeze is indicated.
    pub fn with_refreeze_deviation(mut self, meters: f64) -> Self {
        self.refreeze_deviation = meters;
        self
    }

    fn claim_fragment(&mut self) -> FragmentId {
        let id = FragmentId(self.next_fragment);
        self.next_fragment += 1;
        id
    }

    fn fragment_of(&self, id: AnchorId) -> FragmentId {
        self.frozen
            .get(&id)
            .map(|a| a.fragment)
            .unwrap_or(FragmentId::INVALID)
    }

    /// Freeze every reported anchor the solver has not seen yet.
    fn freeze_new_anchors(&mut self) {
        let new_ids: Vec<AnchorId> = self
            .spongy
            .keys()
            .filter(|id| !self.frozen.contains_key(id))
            .copied()
            .collect();

        for id in new_ids {
            let linked = self
                .edges
                .iter()
                .filter_map(|e| e.other(id))
                .map(|other| self.fragment_of(other))
                .find(|f| f.is_valid());
            let fragment = match linked {
                Some(f) => f,
                None => self.claim_fragment(),
            };
            let pose = self.alignment * self.spongy[&id];
            self.frozen.insert(id, FrozenAnchor { id, fragment, pose });
            debug!(%id, %fragment, "froze new anchor");
        }
    }

    /// locked_from_spongy implied by one visible frozen anchor.
    fn alignment_from(&self, id: AnchorId) -> Option<Pose> {
        let spongy = self.spongy.get(&id)?;
        let frozen = self.frozen.get(&id)?;
        Some(frozen.pose * spongy.inverse())
    }

    fn update_indications(&mut self) {
        self.merge_indicated = self.edges.iter().any(|e| {
            let f1 = self.fragment_of(e.id1);
            let f2 = self.fragment_of(e.id2);
            f1.is_valid() && f2.is_valid() && f1 != f2
        });

        let target = self.most_significant_fragment();
        self.refreeze_indicated = target.is_valid()
            && self.spongy.iter().any(|(id, spongy)| {
                self.frozen.get(id).is_some_and(|f| {
                    f.fragment == target
                        && (self.alignment * *spongy)
                            .position
                            .distance(f.pose.position)
                            > self.refreeze_deviation
                })
            });
    }

    /// Fragments reachable from `target` through edges, excluding `target`.
    fn connected_fragments(&self, target: FragmentId) -> BTreeSet<FragmentId> {
        let mut reached = BTreeSet::from([target]);
        loop {
            let mut grew = false;
            for e in &self.edges {
                let f1 = self.fragment_of(e.id1);
                let f2 = self.fragment_of(e.id2);
                if !f1.is_valid() || !f2.is_valid() {
                    continue;
                }
                if reached.contains(&f1) && reached.insert(f2) {
                    grew = true;
                }
                if reached.contains(&f2) && reached.insert(f1) {
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        reached.remove(&target);
        reached
    }

    fn merge_into(&mut self, target: FragmentId) -> Vec<FragmentAdjustment> {
        let Some(target_alignment) = self.alignment_from(self.most_significant) else {
            return Vec::new();
        };

        let mut absorbed = Vec::new();
        for fragment in self.connected_fragments(target) {
            let visible = self
                .spongy
                .keys()
                .copied()
                .find(|id| self.fragment_of(*id) == fragment);
            let Some(fragment_alignment) = visible.and_then(|id| self.alignment_from(id)) else {
                debug!(%fragment, "no visible anchor, cannot merge yet");
                continue;
            };

            let adjustment = target_alignment * fragment_alignment.inverse();
            for anchor in self.frozen.values_mut() {
                if anchor.fragment == fragment {
                    anchor.fragment = target;
                    anchor.pose = adjustment * anchor.pose;
                }
            }
            absorbed.push(FragmentAdjustment {
                fragment,
                adjustment,
            });
        }
        absorbed
    }
}

impl PoseGraphSolver for LockingSolver {
    fn clear_spongy_anchors(&mut self) {
        self.spongy.clear();
        self.most_significant = AnchorId::INVALID;
    }

    fn step_init(&mut self, spongy_head: Pose) {
        self.spongy_head = spongy_head;
    }

    fn add_spongy_anchors(&mut self, anchors: &[AnchorPose]) {
        for a in anchors {
            self.spongy.insert(a.id, a.pose);
        }
    }

    fn set_most_significant_anchor(&mut self, id: AnchorId) {
        self.most_significant = id;
    }

    fn add_spongy_edges(&mut self, edges: &[Edge]) {
        for e in edges {
            if !e.is_loop() {
                self.edges.insert(*e);
            }
        }
    }

    fn step_finish(&mut self) {
        self.freeze_new_anchors();
        if let Some(alignment) = self.alignment_from(self.most_significant) {
            self.alignment = alignment;
        }
        self.update_indications();
    }

    fn alignment(&self) -> Pose {
        self.alignment
    }

    fn spongy_head(&self) -> Pose {
        self.spongy_head
    }

    fn frozen_anchors(&self) -> Vec<FrozenAnchor> {
        self.frozen.values().copied().collect()
    }

    fn frozen_edges(&self) -> Vec<Edge> {
        self.edges.iter().copied().collect()
    }

    fn most_significant_fragment(&self) -> FragmentId {
        self.fragment_of(self.most_significant)
    }

    fn metrics(&self) -> SolverMetrics {
        let fragments: BTreeSet<FragmentId> = self.frozen.values().map(|a| a.fragment).collect();
        SolverMetrics {
            num_spongy_anchors: self.spongy.len(),
            num_frozen_anchors: self.frozen.len(),
            num_frozen_edges: self.edges.len(),
            num_frozen_fragments: fragments.len(),
            refit_merge_indicated: self.merge_indicated,
            refit_refreeze_indicated: self.refreeze_indicated,
        }
    }

    fn merge(&mut self) -> Option<RefitResult> {
        let target = self.most_significant_fragment();
        if !target.is_valid() {
            return None;
        }
        let absorbed = self.merge_into(target);
        self.update_indications();
        if absorbed.is_empty() {
            return None;
        }
        debug!(%target, count = absorbed.len(), "merged fragments");
        Some(RefitResult {
            merged_fragment: target,
            absorbed,
        })
    }

    fn refreeze(&mut self) -> Option<RefitResult> {
        let target = self.most_significant_fragment();
        if !target.is_valid() {
            return None;
        }
        let absorbed = self.merge_into(target);

        let visible: Vec<(AnchorId, Pose)> = self
            .spongy
            .iter()
            .map(|(id, pose)| (*id, *pose))
            .collect();
        for (id, spongy) in visible {
            if let Some(anchor) = self.frozen.get_mut(&id)
                && anchor.fragment == target
            {
                anchor.pose = self.alignment * spongy;
            }
        }
        self.update_indications();
        debug!(%target, "refroze visible anchors");
        Some(RefitResult {
            merged_fragment: target,
            absorbed,
        })
    }

    fn remove_frozen_anchor(&mut self, id: AnchorId) {
        self.frozen.remove(&id);
        self.spongy.remove(&id);
        self.edges.retain(|e| !e.contains(id));
        if self.most_significant == id {
            self.most_significant = AnchorId::INVALID;
        }
    }

    fn reset(&mut self) {
        *self = Self::new().with_refreeze_deviation(self.refreeze_deviation);
    }

    fn snapshot(&self, include: Include) -> SolverSnapshot {
        let mut snapshot = SolverSnapshot::default();
        if include.persistent {
            snapshot.frozen_anchors = self.frozen_anchors();
            snapshot.frozen_edges = self.frozen_edges();
        }
        if include.transient {
            snapshot.alignment = Some(self.alignment);
            snapshot.spongy_head = Some(self.spongy_head);
        }
        snapshot
    }

    fn restore(&mut self, snapshot: &SolverSnapshot) {
        if !snapshot.frozen_anchors.is_empty() || !snapshot.frozen_edges.is_empty() {
            self.frozen = snapshot
                .frozen_anchors
                .iter()
                .map(|a| (a.id, *a))
                .collect();
            self.edges = snapshot.frozen_edges.iter().copied().collect();
            self.next_fragment = self
                .frozen
                .values()
                .map(|a| a.fragment.0)
                .max()
                .unwrap_or(0)
                + 1;
        }
        if let Some(alignment) = snapshot.alignment {
            self.alignment = alignment;
        }
        if let Some(head) = snapshot.spongy_head {
            self.spongy_head = head;
        }
        self.spongy.clear();
        self.most_significant = AnchorId::INVALID;
        self.update_indications();
    }
}
