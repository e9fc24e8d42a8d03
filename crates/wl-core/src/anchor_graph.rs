//! Anchor graph maintenance.
//!
//! Keeps a spatially well-distributed set of tracker-space anchors as the
//! device moves, links them with edges, and feeds the whole set to the
//! pose-graph solver once per frame.
//!
//! Per frame:
//! 1. Suppress creation for a short while after tracking resumes.
//! 2. Confirm the anchor provisionally created last frame, if it is located.
//! 3. Scan located anchors against the candidate position (head lowered to
//!    the ground offset): outer sphere = max edge length, inner sphere = min
//!    new-anchor distance, and the single nearest anchor.
//! 4. Nothing in the inner sphere: provisionally create an anchor there.
//! 5. Two or more in the inner sphere: link each to the nearest one.
//! 6. Submit anchors, nearest id and new edges to the solver.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::anchor::{AnchorId, AnchorPose, Edge};
use crate::pose::Pose;
use crate::settings::AnchorSettings;
use crate::solver::{Include, PoseGraphSolver, SolverSnapshot};
use crate::tracking::{TrackableHandle, TrackingSource};
use crate::vector::Vec3;

pub const STATUS_LOST_TRACKING: &str = "Lost tracking";
pub const STATUS_NO_ACTIVE_ANCHORS: &str = "No active anchors";

/// Anchor created last frame and awaiting confirmation.
///
/// It gets an id only if it is located on the following frame; otherwise it
/// is destroyed without ever entering the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Provisional {
    #[default]
    None,
    Pending {
        handle: TrackableHandle,
        pose: Pose,
        /// Outer-sphere anchors at creation time; become its edges.
        neighbors: Vec<AnchorId>,
    },
}

impl Provisional {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }
}

#[derive(Clone, Copy, Debug)]
struct TrackedAnchor {
    handle: TrackableHandle,
    /// Last located pose; unknown for reloaded anchors until first located.
    pose: Option<Pose>,
    located: bool,
}

/// Anchor state as seen by callers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnchorInfo {
    pub id: AnchorId,
    pub pose: Option<Pose>,
    pub located: bool,
}

/// Result of scanning the anchor set against the candidate position.
#[derive(Default)]
struct Scan {
    active: Vec<AnchorPose>,
    inner: Vec<AnchorId>,
    outer: Vec<AnchorId>,
    nearest: Option<(AnchorId, f64)>,
}

pub struct AnchorGraphManager {
    settings: AnchorSettings,
    anchors: BTreeMap<AnchorId, TrackedAnchor>,
    edges: BTreeSet<Edge>,
    provisional: Provisional,
    last_id: AnchorId,
    last_tracking_inactive: f64,
    last_anchor_add: f64,
    error_status: String,
}

impl Default for AnchorGraphManager {
    fn default() -> Self {
        Self::new(AnchorSettings::default())
    }
}

impl AnchorGraphManager {
    pub fn new(settings: AnchorSettings) -> Self {
        Self {
            settings: settings.validated(),
            anchors: BTreeMap::new(),
            edges: BTreeSet::new(),
            provisional: Provisional::None,
            last_id: AnchorId::INVALID,
            last_tracking_inactive: f64::NEG_INFINITY,
            last_anchor_add: f64::NEG_INFINITY,
            error_status: String::new(),
        }
    }

    pub fn settings(&self) -> &AnchorSettings {
        &self.settings
    }

    /// Apply new settings; invalid ones fall back to defaults.
    pub fn set_settings(&mut self, settings: AnchorSettings) {
        self.settings = settings.validated();
    }

    /// Empty when the last update succeeded.
    pub fn error_status(&self) -> &str {
        &self.error_status
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn anchors(&self) -> Vec<AnchorInfo> {
        self.anchors
            .iter()
            .map(|(id, a)| AnchorInfo {
                id: *id,
                pose: a.pose,
                located: a.located,
            })
            .collect()
    }

    pub fn edges(&self) -> &BTreeSet<Edge> {
        &self.edges
    }

    pub fn provisional(&self) -> &Provisional {
        &self.provisional
    }

    /// Ids adjacent to `id` in the graph.
    pub fn neighbors(&self, id: AnchorId) -> Vec<AnchorId> {
        self.edges.iter().filter_map(|e| e.other(id)).collect()
    }

    /// Run once per frame. False when tracking is lost or no anchor is active.
    pub fn update(
        &mut self,
        tracker: &mut dyn TrackingSource,
        solver: &mut dyn PoseGraphSolver,
        now: f64,
    ) -> bool {
        if !tracker.is_tracking() {
            self.lost_tracking_cleanup(tracker, now);
            return false;
        }

        let head = tracker.head_pose();
        let candidate = Pose::from_position(
            head.position - Vec3::UP * self.settings.ground_anchor_offset,
        );

        let mut new_edges = Vec::new();
        let new_id = self.finalize_provisional(tracker, &mut new_edges);

        let scan = self.scan(tracker, candidate.position, new_id);

        if !new_id.is_valid() && scan.inner.is_empty() && !self.provisional.is_pending() {
            if now <= self.last_tracking_inactive + self.settings.tracking_start_delay {
                debug!("tracking resumed recently, deferring anchor creation");
            } else if now < self.last_anchor_add + self.settings.anchor_add_out_time {
                debug!("anchor created recently, deferring anchor creation");
            } else {
                self.prepare_provisional(tracker, candidate, scan.outer.clone());
                self.last_anchor_add = now;
            }
        }

        let Some((nearest, _)) = scan.nearest else {
            self.error_status = STATUS_NO_ACTIVE_ANCHORS.to_string();
            return false;
        };

        if scan.inner.len() >= 2 {
            for id in &scan.inner {
                if *id != nearest {
                    new_edges.push(Edge::new(*id, nearest));
                }
            }
        }

        let mut active = scan.active;
        for culled in self.cull(tracker, candidate.position, nearest, new_id) {
            solver.remove_frozen_anchor(culled);
            active.retain(|a| a.id != culled);
            new_edges.retain(|e| !e.contains(culled));
        }

        let new_edges: Vec<Edge> = new_edges
            .into_iter()
            .filter(|e| !e.is_loop() && self.edges.insert(*e))
            .collect();

        solver.clear_spongy_anchors();
        solver.step_init(head);
        solver.add_spongy_anchors(&active);
        solver.set_most_significant_anchor(nearest);
        solver.add_spongy_edges(&new_edges);
        solver.step_finish();

        self.error_status.clear();
        true
    }

    fn lost_tracking_cleanup(&mut self, tracker: &mut dyn TrackingSource, now: f64) {
        if let Provisional::Pending { handle, .. } = std::mem::take(&mut self.provisional) {
            tracker.destroy_anchor(handle);
            debug!("destroyed provisional anchor on tracking loss");
        }
        for a in self.anchors.values_mut() {
            a.located = false;
        }
        self.last_tracking_inactive = now;
        self.error_status = STATUS_LOST_TRACKING.to_string();
    }

    fn claim_anchor_id(&mut self) -> AnchorId {
        self.last_id = self.last_id.next();
        self.last_id
    }

    /// Promote last frame's provisional anchor if it is located now.
    /// Returns the new id, or `INVALID` when nothing was promoted.
    fn finalize_provisional(
        &mut self,
        tracker: &mut dyn TrackingSource,
        edges: &mut Vec<Edge>,
    ) -> AnchorId {
        let Provisional::Pending {
            handle, neighbors, ..
        } = std::mem::take(&mut self.provisional)
        else {
            return AnchorId::INVALID;
        };

        let Some(pose) = tracker.located_pose(handle) else {
            tracker.destroy_anchor(handle);
            debug!("provisional anchor not located on confirmation, dropped");
            return AnchorId::INVALID;
        };

        let id = self.claim_anchor_id();
        for n in neighbors {
            if self.anchors.contains_key(&n) {
                edges.push(Edge::new(id, n));
            }
        }
        self.anchors.insert(
            id,
            TrackedAnchor {
                handle,
                pose: Some(pose),
                located: true,
            },
        );
        debug!(%id, "confirmed new anchor");
        id
    }

    fn scan(&mut self, tracker: &dyn TrackingSource, candidate: Vec3, new_id: AnchorId) -> Scan {
        let inner_sq = self.settings.min_new_anchor_distance.powi(2);
        let outer_sq = self.settings.max_anchor_edge_length.powi(2);
        let mut scan = Scan::default();

        for (id, anchor) in self.anchors.iter_mut() {
            let Some(pose) = tracker.located_pose(anchor.handle) else {
                anchor.located = false;
                continue;
            };
            anchor.pose = Some(pose);
            anchor.located = true;

            let dist_sq = pose.position.distance_squared(candidate);
            scan.active.push(AnchorPose { id: *id, pose });
            if scan.nearest.is_none_or(|(_, best)| dist_sq < best) {
                scan.nearest = Some((*id, dist_sq));
            }
            if dist_sq <= outer_sq && *id != new_id {
                scan.outer.push(*id);
                if dist_sq <= inner_sq {
                    scan.inner.push(*id);
                }
            }
        }
        scan
    }

    fn prepare_provisional(
        &mut self,
        tracker: &mut dyn TrackingSource,
        pose: Pose,
        neighbors: Vec<AnchorId>,
    ) {
        match tracker.create_anchor(pose) {
            Some(handle) => {
                self.provisional = Provisional::Pending {
                    handle,
                    pose,
                    neighbors,
                };
            }
            None => warn!("tracking source refused to create an anchor"),
        }
    }

    /// Drop the farthest anchors beyond `max_local_anchors`.
    /// Anchors never located this session go last.
    fn cull(
        &mut self,
        tracker: &mut dyn TrackingSource,
        candidate: Vec3,
        nearest: AnchorId,
        new_id: AnchorId,
    ) -> Vec<AnchorId> {
        let max = self.settings.max_local_anchors;
        if max == 0 || self.anchors.len() <= max {
            return Vec::new();
        }

        let mut by_distance: Vec<(AnchorId, f64)> = self
            .anchors
            .iter()
            .filter(|(id, _)| **id != nearest && **id != new_id)
            .map(|(id, a)| {
                let dist_sq = a
                    .pose
                    .map_or(f64::NEG_INFINITY, |p| p.position.distance_squared(candidate));
                (*id, dist_sq)
            })
            .collect();
        by_distance.sort_by(|a, b| b.1.total_cmp(&a.1));

        let excess = self.anchors.len() - max;
        let culled: Vec<AnchorId> = by_distance.into_iter().take(excess).map(|(id, _)| id).collect();
        for id in &culled {
            if let Some(anchor) = self.anchors.remove(id) {
                tracker.destroy_anchor(anchor.handle);
            }
            self.edges.retain(|e| !e.contains(*id));
            debug!(%id, "culled distant anchor");
        }
        culled
    }

    /// Destroy every anchor and clear the solver.
    pub fn reset(&mut self, tracker: &mut dyn TrackingSource, solver: &mut dyn PoseGraphSolver) {
        if let Provisional::Pending { handle, .. } = std::mem::take(&mut self.provisional) {
            tracker.destroy_anchor(handle);
        }
        for a in self.anchors.values() {
            tracker.destroy_anchor(a.handle);
        }
        self.anchors.clear();
        self.edges.clear();
        solver.reset();
        self.error_status.clear();
        info!("anchor graph reset");
    }

    /// Persist every anchor in the platform store and return the graph record.
    pub fn save_anchors(
        &self,
        tracker: &mut dyn TrackingSource,
        solver: &dyn PoseGraphSolver,
    ) -> SolverSnapshot {
        tracker.clear_persisted_anchors();
        let mut persisted = 0;
        for (id, a) in &self.anchors {
            if tracker.persist_anchor(*id, a.handle) {
                persisted += 1;
            } else {
                warn!(%id, "platform refused to persist anchor");
            }
        }
        debug!(persisted, "persisted anchors");
        solver.snapshot(Include::PERSISTENT)
    }

    /// Rebuild the graph from a saved record.
    ///
    /// Reconstructs exactly the anchors the solver knows after restoring; any
    /// that the platform cannot reload is removed from the solver as well.
    /// Returns the number of anchors restored.
    pub fn load_anchors(
        &mut self,
        tracker: &mut dyn TrackingSource,
        solver: &mut dyn PoseGraphSolver,
        snapshot: &SolverSnapshot,
    ) -> usize {
        self.reset(tracker, solver);
        solver.restore(snapshot);

        for frozen in solver.frozen_anchors() {
            match tracker.restore_anchor(frozen.id) {
                Some(handle) => {
                    self.anchors.insert(
                        frozen.id,
                        TrackedAnchor {
                            handle,
                            pose: None,
                            located: false,
                        },
                    );
                }
                None => {
                    warn!(id = %frozen.id, "anchor failed to reload, removing from solver");
                    solver.remove_frozen_anchor(frozen.id);
                }
            }
        }

        self.edges = solver
            .frozen_edges()
            .into_iter()
            .filter(|e| self.anchors.contains_key(&e.id1) && self.anchors.contains_key(&e.id2))
            .collect();
        self.last_id = self.last_id.max(snapshot.max_anchor_id());
        info!(anchors = self.anchors.len(), edges = self.edges.len(), "loaded anchor graph");
        self.anchors.len()
    }
}
