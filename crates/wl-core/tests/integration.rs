//! Integration tests driving the whole engine through simulated sessions:
//! walk → anchor graph → solver → pins → adjustment, and save → restart → load.

use std::collections::BTreeSet;

use approx::assert_relative_eq;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use wl_core::{
    AlignmentManager, AnchorGraphManager, AnchorId, AnchorPose, Edge, FragmentId, FrameChain, FrameOutcome, LockingSolver,
    FrozenAnchor, Include, PoseGraphSolver, Pose, Quaternion, RefitResult, SceneAnchor, Settings,
    SimulatedTracker, SolverMetrics, SolverSnapshot, Space, TrackingSource, Vec3,
    WorldLockingManager,
};

const DT: f64 = 1.0 / 30.0;

fn rng() -> SmallRng {
    SmallRng::seed_from_u64(42)
}

#[derive(Default)]
struct Scene {
    adjustment: Pose,
}

impl SceneAnchor for Scene {
    fn set_adjustment(&mut self, adjustment: Pose) {
        self.adjustment = adjustment;
    }
}

/// Walk a square loop, 5 cm per frame.
fn square_walk(frames: usize) -> Vec<Vec3> {
    let side = 4.0;
    (0..frames)
        .map(|i| {
            let d = (i as f64 * 0.05) % (4.0 * side);
            let (x, z) = match (d / side) as usize {
                0 => (d, 0.0),
                1 => (side, d - side),
                2 => (3.0 * side - d, side),
                _ => (0.0, 4.0 * side - d),
            };
            Vec3::new(x, 1.6, z)
        })
        .collect()
}

#[test]
fn density_invariant_after_walk() {
    let mut mgr = AnchorGraphManager::default();
    let mut tracker = SimulatedTracker::new();
    let mut solver = LockingSolver::new();
    let max_edge = mgr.settings().max_anchor_edge_length;

    let mut t = 0.0;
    for head in square_walk(400) {
        tracker.set_head(Pose::from_position(head));
        mgr.update(&mut tracker, &mut solver, t);
        t += DT;
    }

    let anchors: Vec<(AnchorId, Vec3)> = mgr
        .anchors()
        .iter()
        .map(|a| (a.id, a.pose.unwrap().position))
        .collect();
    assert!(anchors.len() > 5, "only {} anchors", anchors.len());
    for (id, at) in &anchors {
        let has_close = anchors
            .iter()
            .any(|(other, p)| other != id && at.distance(*p) <= max_edge + 1e-9);
        assert!(has_close, "{id} is isolated");
    }
}

/// Locking solver that keeps every edge batch it is handed, one per frame.
#[derive(Default)]
struct RecordingSolver {
    inner: LockingSolver,
    submitted: Vec<Vec<Edge>>,
}

impl PoseGraphSolver for RecordingSolver {
    fn clear_spongy_anchors(&mut self) {
        self.inner.clear_spongy_anchors();
    }
    fn step_init(&mut self, spongy_head: Pose) {
        self.inner.step_init(spongy_head);
    }
    fn add_spongy_anchors(&mut self, anchors: &[AnchorPose]) {
        self.inner.add_spongy_anchors(anchors);
    }
    fn set_most_significant_anchor(&mut self, id: AnchorId) {
        self.inner.set_most_significant_anchor(id);
    }
    fn add_spongy_edges(&mut self, edges: &[Edge]) {
        self.submitted.push(edges.to_vec());
        self.inner.add_spongy_edges(edges);
    }
    fn step_finish(&mut self) {
        self.inner.step_finish();
    }
    fn alignment(&self) -> Pose {
        self.inner.alignment()
    }
    fn spongy_head(&self) -> Pose {
        self.inner.spongy_head()
    }
    fn frozen_anchors(&self) -> Vec<FrozenAnchor> {
        self.inner.frozen_anchors()
    }
    fn frozen_edges(&self) -> Vec<Edge> {
        self.inner.frozen_edges()
    }
    fn most_significant_fragment(&self) -> FragmentId {
        self.inner.most_significant_fragment()
    }
    fn metrics(&self) -> SolverMetrics {
        self.inner.metrics()
    }
    fn merge(&mut self) -> Option<RefitResult> {
        self.inner.merge()
    }
    fn refreeze(&mut self) -> Option<RefitResult> {
        self.inner.refreeze()
    }
    fn remove_frozen_anchor(&mut self, id: AnchorId) {
        self.inner.remove_frozen_anchor(id);
    }
    fn reset(&mut self) {
        self.inner.reset();
    }
    fn snapshot(&self, include: Include) -> SolverSnapshot {
        self.inner.snapshot(include)
    }
    fn restore(&mut self, snapshot: &SolverSnapshot) {
        self.inner.restore(snapshot);
    }
}

#[test]
fn submitted_edges_are_unique() {
    let mut mgr = AnchorGraphManager::default();
    let mut tracker = SimulatedTracker::new();
    let mut solver = RecordingSolver::default();

    // Several laps, so every spot is revisited
    let frames = 1500;
    let mut t = 0.0;
    for head in square_walk(frames) {
        tracker.set_head(Pose::from_position(head));
        mgr.update(&mut tracker, &mut solver, t);
        t += DT;
    }

    assert!(solver.submitted.len() > frames / 2);
    let mut seen = BTreeSet::new();
    for (frame, batch) in solver.submitted.iter().enumerate() {
        for edge in batch {
            assert!(edge.id1 < edge.id2, "unordered {edge:?}");
            assert!(seen.insert(*edge), "{edge:?} resubmitted on frame {frame}");
        }
    }
    assert!(!seen.is_empty());
    assert_eq!(seen.len(), solver.frozen_edges().len());
    assert_eq!(mgr.edges().len(), seen.len());
}

#[test]
fn drift_is_cancelled_along_a_walk() {
    let mut mgr = WorldLockingManager::new(LockingSolver::new(), Settings::default());
    let mut tracker = SimulatedTracker::new();
    let mut scene = Scene::default();
    let mut rng = rng();

    let mut t = 0.0;
    for head in square_walk(300) {
        tracker.set_head(Pose::from_position(head));
        tracker.drift_step(&mut rng, 0.002, 0.0005);
        mgr.update(&mut tracker, &mut scene, t);
        t += DT;
    }

    let injected = tracker.drift().position.length();
    assert!(injected > 0.0);

    // Content at a fixed locked point should stay near its world point
    let world_head = tracker.head_world();
    let seen = scene.adjustment * tracker.head_pose();
    let error = seen.position.distance(world_head.position);
    assert!(error < 0.5, "residual drift {error}");
}

#[test]
fn pinned_alignment_survives_save_and_load() {
    let mut alignment = AlignmentManager::default();
    let locked = |x: f64| Pose::from_position(Vec3::new(x, 0.0, 0.0));

    alignment.add_alignment_anchor("pin0", locked(0.0), locked(0.0));
    alignment.add_alignment_anchor("pin1", locked(1.0), locked(2.0));
    alignment.send_alignment_anchors();

    let mapped = |a: &AlignmentManager| {
        a.compute_pinned_pose(locked(1.0))
            .transform_point(Vec3::new(1.0, 0.0, 0.0))
    };
    let before = mapped(&alignment);
    assert_relative_eq!(before.x, 0.5, epsilon = 1e-9);

    let saved = alignment.save();
    let json = serde_json::to_string(&saved).unwrap();

    alignment.clear_alignment_anchors();
    alignment.send_alignment_anchors();
    assert_eq!(alignment.compute_pinned_pose(locked(1.0)), Pose::identity());

    let loaded = serde_json::from_str(&json).unwrap();
    alignment.load(&loaded);
    alignment.restore_alignment_anchor("pin0", locked(0.0)).unwrap();
    alignment.restore_alignment_anchor("pin1", locked(1.0)).unwrap();
    alignment.send_alignment_anchors();

    let after = mapped(&alignment);
    assert_relative_eq!(after.x, before.x, epsilon = 1e-12);
    assert_relative_eq!(after.z, before.z, epsilon = 1e-12);
}

#[test]
fn session_restart_restores_world_frame() {
    let mut mgr = WorldLockingManager::new(LockingSolver::new(), Settings::default());
    let mut tracker = SimulatedTracker::new();
    let mut scene = Scene::default();

    let mut t = 0.0;
    for head in square_walk(200) {
        tracker.set_head(Pose::from_position(head));
        mgr.update(&mut tracker, &mut scene, t);
        t += DT;
    }
    let saved = mgr.begin_save(&mut tracker, t).unwrap();
    mgr.finish_save();
    let platform = tracker.platform_store().clone();
    let json = serde_json::to_string(&saved).unwrap();

    // New process: fresh engine, tracker with a different origin
    let mut mgr = WorldLockingManager::new(LockingSolver::new(), Settings::default());
    let mut tracker = SimulatedTracker::new().with_store(platform);
    tracker.restart_session(Pose::new(Vec3::new(3.0, 0.0, -1.0), Quaternion::from_yaw(0.8)));

    assert!(mgr.begin_load());
    assert_eq!(mgr.update(&mut tracker, &mut scene, 0.0), FrameOutcome::Loading);
    mgr.finish_load(&mut tracker, Some(serde_json::from_str(&json).unwrap()));
    assert_eq!(mgr.anchors().anchor_count(), saved.anchors.frozen_anchors.len());

    tracker.set_head(Pose::from_position(Vec3::new(0.0, 1.6, 0.0)));
    assert_eq!(mgr.update(&mut tracker, &mut scene, DT), FrameOutcome::Stabilized);

    let seen = scene.adjustment * tracker.head_pose();
    assert!(
        seen.approx_eq(tracker.head_world(), 1e-6),
        "world frame not restored: {seen:?}"
    );
}

fn arb_pose() -> impl Strategy<Value = Pose> {
    (
        -10.0..10.0f64,
        -10.0..10.0f64,
        -10.0..10.0f64,
        -1.0..1.0f64,
        -1.0..1.0f64,
        -1.0..1.0f64,
        -1.0..1.0f64,
    )
        .prop_map(|(x, y, z, qw, qx, qy, qz)| {
            Pose::new(Vec3::new(x, y, z), Quaternion::new(qw, qx, qy, qz))
        })
}

proptest! {
    #[test]
    fn pinned_locked_round_trip(p in arb_pose(), pin in arb_pose(), align in arb_pose()) {
        let chain = FrameChain {
            locked_from_spongy: align,
            pinned_from_locked: pin,
            ..FrameChain::default()
        };
        let there = chain.convert_pose(p, Space::Locked, Space::Pinned);
        let back = chain.convert_pose(there, Space::Pinned, Space::Locked);
        prop_assert!(back.approx_eq(p, 1e-6));

        let frozen = chain.convert_pose(p, Space::Spongy, Space::Locked);
        let spongy = chain.convert_pose(frozen, Space::Locked, Space::Spongy);
        prop_assert!(spongy.approx_eq(p, 1e-6));
    }
}
