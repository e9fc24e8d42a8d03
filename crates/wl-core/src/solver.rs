//! Boundary to the pose-graph solver.
//!
//! The solver is fed a complete anchor/edge snapshot every frame and hands
//! back one rigid correction (locked from spongy) plus a partition of the
//! anchors into fragments. How it computes that is its own business; the
//! engine relies only on this trait.

use serde::{Deserialize, Serialize};

use crate::anchor::{AnchorId, AnchorPose, Edge, FragmentId, FrozenAnchor};
use crate::pose::Pose;

/// Which parts of solver state a snapshot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Include {
    /// Frozen anchors and edges: survives sessions.
    pub persistent: bool,
    /// Alignment and head: only meaningful within one tracking session.
    pub transient: bool,
}

impl Include {
    pub const ALL: Self = Self {
        persistent: true,
        transient: true,
    };
    pub const PERSISTENT: Self = Self {
        persistent: true,
        transient: false,
    };
}

/// Serializable solver state: the anchor-graph record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverSnapshot {
    #[serde(default)]
    pub frozen_anchors: Vec<FrozenAnchor>,
    #[serde(default)]
    pub frozen_edges: Vec<Edge>,
    #[serde(default)]
    pub alignment: Option<Pose>,
    #[serde(default)]
    pub spongy_head: Option<Pose>,
}

impl SolverSnapshot {
    pub fn anchor_ids(&self) -> Vec<AnchorId> {
        self.frozen_anchors.iter().map(|a| a.id).collect()
    }

    pub fn max_anchor_id(&self) -> AnchorId {
        self.frozen_anchors
            .iter()
            .map(|a| a.id)
            .max()
            .unwrap_or(AnchorId::INVALID)
    }
}

/// Counters and refit indications for the last step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SolverMetrics {
    pub num_spongy_anchors: usize,
    pub num_frozen_anchors: usize,
    pub num_frozen_edges: usize,
    pub num_frozen_fragments: usize,
    pub refit_merge_indicated: bool,
    pub refit_refreeze_indicated: bool,
}

/// Correction applied to one fragment by a refit: new locked from old locked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FragmentAdjustment {
    pub fragment: FragmentId,
    pub adjustment: Pose,
}

/// Outcome of a merge or refreeze.
#[derive(Clone, Debug, PartialEq)]
pub struct RefitResult {
    /// Fragment that absorbed the others.
    pub merged_fragment: FragmentId,
    /// Fragments folded into `merged_fragment`, with their corrections.
    pub absorbed: Vec<FragmentAdjustment>,
}

/// Pose-graph solver invoked once per frame.
///
/// Per-frame protocol, in order: `clear_spongy_anchors`, `step_init`,
/// `add_spongy_anchors`, `set_most_significant_anchor`, `add_spongy_edges`,
/// `step_finish`. Queries are valid after `step_finish`.
pub trait PoseGraphSolver {
    fn clear_spongy_anchors(&mut self);
    fn step_init(&mut self, spongy_head: Pose);
    fn add_spongy_anchors(&mut self, anchors: &[AnchorPose]);
    fn set_most_significant_anchor(&mut self, id: AnchorId);
    fn add_spongy_edges(&mut self, edges: &[Edge]);
    fn step_finish(&mut self);

    /// Current locked-from-spongy correction.
    fn alignment(&self) -> Pose;
    fn spongy_head(&self) -> Pose;
    fn frozen_anchors(&self) -> Vec<FrozenAnchor>;
    fn frozen_edges(&self) -> Vec<Edge>;
    fn most_significant_fragment(&self) -> FragmentId;
    fn metrics(&self) -> SolverMetrics;

    /// Fold fragments connected to the most significant one into it.
    fn merge(&mut self) -> Option<RefitResult>;
    /// Re-freeze the visible graph to absorb accumulated relative drift.
    fn refreeze(&mut self) -> Option<RefitResult>;

    /// Forget an anchor and every edge touching it.
    fn remove_frozen_anchor(&mut self, id: AnchorId);
    fn reset(&mut self);

    fn snapshot(&self, include: Include) -> SolverSnapshot;
    fn restore(&mut self, snapshot: &SolverSnapshot);
}
