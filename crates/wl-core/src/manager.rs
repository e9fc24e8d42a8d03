//! Frame composition: the per-frame driver of the whole engine.
//!
//! Each frame runs the anchor graph and solver, composes
//! `adjustment = pinned_from_locked * locked_from_playspace` and writes it to
//! the scene anchor node. Persistence is split into begin/finish halves so
//! the file I/O in between can run off the frame thread; a busy flag makes
//! save and load mutually exclusive and drops overlapping requests.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::alignment::{AlignmentManager, AlignmentSnapshot};
use crate::anchor_graph::AnchorGraphManager;
use crate::fragment::FragmentManager;
use crate::frames::FrameChain;
use crate::orientation::TripleOrienter;
use crate::pose::Pose;
use crate::settings::Settings;
use crate::solver::{PoseGraphSolver, RefitResult, SolverSnapshot};
use crate::tracking::TrackingSource;

pub const STATUS_DISABLED: &str = "Disabled";
pub const STATUS_LOADING: &str = "Loading";

/// The scene node that all world-locked content is parented under.
pub trait SceneAnchor {
    fn set_adjustment(&mut self, adjustment: Pose);
}

/// What one call to `update` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Adjustment recomputed from the solver and pins.
    Stabilized,
    /// Tracking lost or no active anchors; adjustment held.
    Paused,
    /// Stabilization switched off; adjustment held.
    Disabled,
    /// A load is in flight; nothing touched.
    Loading,
}

/// Everything persisted between sessions: the anchor-graph record and the
/// alignment record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedState {
    pub anchors: SolverSnapshot,
    pub alignment: AlignmentSnapshot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Busy {
    Idle,
    Saving,
    Loading,
}

pub struct WorldLockingManager<S: PoseGraphSolver> {
    settings: Settings,
    solver: S,
    anchors: AnchorGraphManager,
    alignment: AlignmentManager,
    fragments: FragmentManager,
    frames: FrameChain,
    status: String,
    busy: Busy,
    last_save: f64,
}

impl<S: PoseGraphSolver> WorldLockingManager<S> {
    pub fn new(solver: S, settings: Settings) -> Self {
        let settings = settings.validated();
        Self {
            anchors: AnchorGraphManager::new(settings.anchors),
            alignment: AlignmentManager::with_config(settings.orientation),
            settings,
            solver,
            fragments: FragmentManager::new(),
            frames: FrameChain::new(),
            status: String::new(),
            busy: Busy::Idle,
            last_save: 0.0,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Apply new settings. Invalid sections fall back to defaults.
    pub fn apply_settings(&mut self, settings: Settings) {
        let settings = settings.validated();
        self.anchors.set_settings(settings.anchors);
        if settings.orientation != self.settings.orientation {
            self.alignment
                .set_orienter(Box::new(TripleOrienter::new(settings.orientation)));
        }
        self.settings = settings;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    /// Human-readable state of the last frame. Empty when stabilized.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn frames(&self) -> &FrameChain {
        &self.frames
    }

    pub fn adjustment(&self) -> Pose {
        self.frames.adjustment()
    }

    /// App-applied camera rig transform, e.g. a teleport.
    pub fn set_playspace_from_spongy(&mut self, pose: Pose) {
        self.frames.playspace_from_spongy = pose;
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn anchors(&self) -> &AnchorGraphManager {
        &self.anchors
    }

    pub fn alignment(&self) -> &AlignmentManager {
        &self.alignment
    }

    pub fn alignment_mut(&mut self) -> &mut AlignmentManager {
        &mut self.alignment
    }

    pub fn fragments(&self) -> &FragmentManager {
        &self.fragments
    }

    pub fn fragments_mut(&mut self) -> &mut FragmentManager {
        &mut self.fragments
    }

    pub fn is_saving(&self) -> bool {
        self.busy == Busy::Saving
    }

    pub fn is_loading(&self) -> bool {
        self.busy == Busy::Loading
    }

    /// Run one frame.
    pub fn update(
        &mut self,
        tracker: &mut dyn TrackingSource,
        scene: &mut dyn SceneAnchor,
        now: f64,
    ) -> FrameOutcome {
        if self.busy == Busy::Loading {
            self.status = STATUS_LOADING.to_string();
            return FrameOutcome::Loading;
        }

        if !self.settings.enabled {
            self.status = STATUS_DISABLED.to_string();
            scene.set_adjustment(self.frames.adjustment());
            return FrameOutcome::Disabled;
        }

        if !self.anchors.update(tracker, &mut self.solver, now) {
            self.fragments.pause();
            self.status = self.anchors.error_status().to_string();
            scene.set_adjustment(self.frames.adjustment());
            return FrameOutcome::Paused;
        }

        self.handle_refits();

        let fragment = self.solver.most_significant_fragment();
        self.fragments.update(fragment);
        self.alignment.set_active_fragment(fragment);

        self.frames.locked_from_spongy = self.solver.alignment();
        let locked_head = self.frames.locked_head(tracker.head_pose());
        self.frames.pinned_from_locked = self.alignment.compute_pinned_pose(locked_head);

        scene.set_adjustment(self.frames.adjustment());
        self.status.clear();
        FrameOutcome::Stabilized
    }

    fn handle_refits(&mut self) {
        let metrics = self.solver.metrics();
        let merged = self.settings.auto_merge && metrics.refit_merge_indicated && self.merge();
        if !merged && self.settings.auto_refreeze && metrics.refit_refreeze_indicated {
            self.refreeze();
        }
    }

    /// Merge fragments now. True if anything merged.
    pub fn merge(&mut self) -> bool {
        match self.solver.merge() {
            Some(refit) => {
                self.apply_refit(&refit);
                true
            }
            None => false,
        }
    }

    /// Refreeze the visible graph now. True if the solver refroze.
    pub fn refreeze(&mut self) -> bool {
        match self.solver.refreeze() {
            Some(refit) => {
                self.apply_refit(&refit);
                true
            }
            None => false,
        }
    }

    fn apply_refit(&mut self, refit: &RefitResult) {
        info!(
            fragment = %refit.merged_fragment,
            absorbed = refit.absorbed.len(),
            "applying refit"
        );
        self.fragments.apply_refit(refit);
        self.alignment.apply_refit(refit);
    }

    /// Drop the anchor graph, fragments and pins.
    pub fn reset(&mut self, tracker: &mut dyn TrackingSource) {
        self.anchors.reset(tracker, &mut self.solver);
        self.fragments.reset();
        self.alignment.reset();
        self.frames.locked_from_spongy = Pose::identity();
        self.frames.pinned_from_locked = Pose::identity();
        info!("world locking state reset");
    }

    /// Whether an automatic save should start now.
    pub fn save_due(&self, now: f64) -> bool {
        self.settings.auto_save
            && self.busy == Busy::Idle
            && now - self.last_save >= self.settings.save_interval
    }

    /// Start a save: snapshot the state for writing elsewhere.
    ///
    /// `None` while another save or load is in flight; the request is dropped.
    pub fn begin_save(&mut self, tracker: &mut dyn TrackingSource, now: f64) -> Option<SavedState> {
        if self.busy != Busy::Idle {
            debug!(busy = ?self.busy, "save request dropped");
            return None;
        }
        self.busy = Busy::Saving;
        self.last_save = now;
        Some(SavedState {
            anchors: self.anchors.save_anchors(tracker, &self.solver),
            alignment: self.alignment.save(),
        })
    }

    pub fn finish_save(&mut self) {
        if self.busy == Busy::Saving {
            self.busy = Busy::Idle;
        }
    }

    /// Start a load. False (dropped) while another save or load is in flight.
    pub fn begin_load(&mut self) -> bool {
        if self.busy != Busy::Idle {
            debug!(busy = ?self.busy, "load request dropped");
            return false;
        }
        self.busy = Busy::Loading;
        true
    }

    /// Finish a load with whatever could be read; `None` resets.
    pub fn finish_load(&mut self, tracker: &mut dyn TrackingSource, state: Option<SavedState>) {
        if self.busy != Busy::Loading {
            return;
        }
        self.busy = Busy::Idle;
        match state {
            Some(state) => {
                self.fragments.reset();
                self.anchors
                    .load_anchors(tracker, &mut self.solver, &state.anchors);
                self.alignment.load(&state.alignment);
            }
            None => {
                info!("nothing to load, starting clean");
                self.reset(tracker);
            }
        }
    }
}
