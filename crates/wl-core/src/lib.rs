//! World-locking engine.
//!
//! Stabilizes a drifting pose tracker against a persistent world frame.
//! A graph of tracker-space anchors is grown as the device moves and fed to
//! a pose-graph solver each frame; the solver's correction, refined by
//! user alignment pins, is composed into one adjustment pose applied to
//! the scene.
//!
//! Zero I/O: persistence hands out snapshots and takes them back, the
//! caller decides where bytes go.

pub mod alignment;
pub mod anchor;
pub mod anchor_graph;
pub mod constants;
pub mod fragment;
pub mod frames;
pub mod locking_solver;
pub mod manager;
pub mod orientation;
pub mod pose;
pub mod quaternion;
pub mod settings;
pub mod simulation;
pub mod solver;
pub mod tracking;
pub mod vector;

pub use alignment::{AlignmentAnchor, AlignmentManager, AlignmentSnapshot, SavedPin};
pub use anchor::{AlignmentId, AnchorId, AnchorPose, Edge, FragmentId, FrozenAnchor};
pub use anchor_graph::{AnchorGraphManager, AnchorInfo, Provisional};
pub use constants::{EPSILON, SLERP_THRESHOLD};
pub use fragment::{AttachmentId, AttachmentPoint, FragmentManager, FragmentState};
pub use frames::{FrameChain, Space};
pub use locking_solver::LockingSolver;
pub use manager::{FrameOutcome, SavedState, SceneAnchor, WorldLockingManager};
pub use orientation::{
    AlignmentContext, Correspondence, Orienter, OrienterConfig, PairOrienter, TripleOrienter,
};
pub use pose::Pose;
pub use quaternion::Quaternion;
pub use settings::{AnchorSettings, Settings};
pub use simulation::{PlatformAnchorStore, SimulatedTracker};
pub use solver::{
    FragmentAdjustment, Include, PoseGraphSolver, RefitResult, SolverMetrics, SolverSnapshot,
};
pub use tracking::{LocatedPose, TrackableHandle, TrackingSource};
pub use vector::Vec3;
