//! Simulated world-locking session: a scripted walk through a drifting
//! tracker, with asynchronous load at start and periodic asynchronous saves.

use std::str::FromStr;

use anyhow::{Context, Result, anyhow, bail};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wl_core::{
    FrameOutcome, LockingSolver, Pose, Quaternion, SavedState, SceneAnchor, Settings,
    SimulatedTracker, TrackingSource, Vec3, WorldLockingManager,
};
use wl_store::StateStore;

/// A pin given on the command line as `name:mx,my,mz:lx,ly,lz`.
#[derive(Clone, Debug, PartialEq)]
pub struct PinSpec {
    pub name: String,
    pub model: Vec3,
    pub locked: Vec3,
}

impl FromStr for PinSpec {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let (Some(name), Some(model), Some(locked), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            bail!("expected name:mx,my,mz:lx,ly,lz, got '{s}'");
        };
        if name.is_empty() {
            bail!("pin name must not be empty");
        }
        Ok(Self {
            name: name.to_string(),
            model: parse_vec3(model)?,
            locked: parse_vec3(locked)?,
        })
    }
}

fn parse_vec3(s: &str) -> Result<Vec3> {
    let coords = s
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("invalid coordinates '{s}'"))?;
    match coords.as_slice() {
        [x, y, z] => Ok(Vec3::new(*x, *y, *z)),
        _ => Err(anyhow!("expected three coordinates, got '{s}'")),
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub frames: usize,
    /// Simulated seconds per frame.
    pub dt: f64,
    pub seed: u64,
    /// Radius of the circular walk, meters.
    pub radius: f64,
    /// Walking speed, meters per second.
    pub speed: f64,
    /// Per-frame drift random walk: translation (m) and rotation (rad).
    pub drift_meters: f64,
    pub drift_radians: f64,
    pub pins: Vec<PinSpec>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            frames: 600,
            dt: 1.0 / 30.0,
            seed: 42,
            radius: 3.0,
            speed: 1.0,
            drift_meters: 0.0005,
            drift_radians: 0.0001,
            pins: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionReport {
    pub frames: usize,
    pub stabilized: usize,
    pub paused: usize,
    pub loading: usize,
    pub loaded: bool,
    pub saves: usize,
    pub save_failures: usize,
    pub anchors: usize,
    pub edges: usize,
    pub pins: usize,
    pub fragments: usize,
    /// Largest distance between where the stabilized head appears and where
    /// it really is, after the first anchor exists.
    pub max_error: f64,
    /// Last adjustment pose handed to the scene.
    pub adjustment: Pose,
    pub status: String,
}

/// Receives the adjustment pose; remembers the latest.
#[derive(Default)]
struct Scene {
    adjustment: Pose,
}

impl SceneAnchor for Scene {
    fn set_adjustment(&mut self, adjustment: Pose) {
        self.adjustment = adjustment;
    }
}

pub struct Session {
    manager: WorldLockingManager<LockingSolver>,
    tracker: SimulatedTracker,
    scene: Scene,
    store: StateStore,
    saving: Option<JoinHandle<wl_store::Result<()>>>,
    loading: Option<JoinHandle<wl_store::Result<Option<SavedState>>>>,
    loaded: bool,
    clock: f64,
}

impl Session {
    /// New session over `store`. The platform anchor store is read
    /// synchronously since the tracker needs it before the first frame.
    pub fn open(store: StateStore, settings: Settings, origin_yaw: f64) -> Self {
        let platform = match store.load_platform() {
            Ok(platform) => platform.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "platform anchor store unreadable, starting empty");
                Default::default()
            }
        };
        debug!(anchors = platform.len(), "platform anchor store loaded");

        let mut tracker = SimulatedTracker::new().with_store(platform);
        tracker.restart_session(Pose::from_rotation(Quaternion::from_yaw(origin_yaw)));

        Self {
            manager: WorldLockingManager::new(LockingSolver::new(), settings),
            tracker,
            scene: Scene::default(),
            store,
            saving: None,
            loading: None,
            loaded: false,
            clock: 0.0,
        }
    }

    /// Kick off a background load if auto-load is on and state exists.
    pub fn start_load(&mut self) -> bool {
        if !self.manager.settings().auto_load || !self.store.has_state() {
            return false;
        }
        if !self.manager.begin_load() {
            return false;
        }
        let store = self.store.clone();
        self.loading = Some(tokio::task::spawn_blocking(move || store.load_state()));
        info!("loading persisted state");
        true
    }

    /// Block on an in-flight load. True when persisted state was applied.
    pub async fn wait_for_load(&mut self) -> Result<bool> {
        if let Some(handle) = self.loading.take() {
            self.complete_load(handle).await?;
        }
        Ok(self.loaded)
    }

    pub async fn run(&mut self, opts: &SessionOptions) -> Result<SessionReport> {
        let mut rng = SmallRng::seed_from_u64(opts.seed);
        let mut report = SessionReport::default();
        let mut pins_sent = opts.pins.is_empty();

        for frame in 0..opts.frames {
            self.poll_load().await?;
            if !pins_sent && !self.manager.is_loading() {
                self.send_pins(&opts.pins);
                pins_sent = true;
            }

            let head = walk_position(opts, self.clock);
            self.tracker.set_head(Pose::from_position(head));
            if opts.drift_meters > 0.0 || opts.drift_radians > 0.0 {
                self.tracker
                    .drift_step(&mut rng, opts.drift_meters, opts.drift_radians);
            }

            match self
                .manager
                .update(&mut self.tracker, &mut self.scene, self.clock)
            {
                FrameOutcome::Stabilized => {
                    report.stabilized += 1;
                    if self.manager.anchors().anchor_count() > 0 {
                        let seen = self.manager.frames().locked_head(self.tracker.head_pose());
                        let error = seen.position.distance(self.tracker.head_world().position);
                        report.max_error = report.max_error.max(error);
                    }
                }
                FrameOutcome::Paused => report.paused += 1,
                FrameOutcome::Loading => report.loading += 1,
                FrameOutcome::Disabled => {}
            }

            self.poll_save(&mut report).await;
            if self.saving.is_none() && self.manager.save_due(self.clock) {
                self.start_save();
            }

            report.frames = frame + 1;
            self.clock += opts.dt;
        }

        self.wait_for_load().await?;
        if !pins_sent {
            self.send_pins(&opts.pins);
        }
        if let Some(handle) = self.saving.take() {
            self.complete_save(handle, &mut report).await;
        }
        if self.manager.settings().auto_save && !self.manager.is_loading() {
            self.start_save();
            if let Some(handle) = self.saving.take() {
                self.complete_save(handle, &mut report).await;
            }
        }

        report.loaded = self.loaded;
        report.anchors = self.manager.anchors().anchor_count();
        report.edges = self.manager.anchors().edges().len();
        report.pins = self.manager.alignment().anchors().len();
        report.fragments = self.manager.fragments().fragment_count();
        report.adjustment = self.scene.adjustment;
        report.status = self.manager.status().to_string();
        Ok(report)
    }

    fn send_pins(&mut self, pins: &[PinSpec]) {
        let alignment = self.manager.alignment_mut();
        for pin in pins {
            alignment.add_alignment_anchor(
                &pin.name,
                Pose::from_position(pin.model),
                Pose::from_position(pin.locked),
            );
        }
        alignment.send_alignment_anchors();
        info!(pins = pins.len(), "alignment pins sent");
    }

    async fn poll_load(&mut self) -> Result<()> {
        if self.loading.as_ref().is_some_and(|h| h.is_finished())
            && let Some(handle) = self.loading.take()
        {
            self.complete_load(handle).await?;
        }
        Ok(())
    }

    async fn complete_load(
        &mut self,
        handle: JoinHandle<wl_store::Result<Option<SavedState>>>,
    ) -> Result<()> {
        let state = match handle.await.context("load task panicked")? {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "failed to load persisted state, starting clean");
                None
            }
        };
        self.loaded = state.is_some();
        self.manager.finish_load(&mut self.tracker, state);
        info!(
            anchors = self.manager.anchors().anchor_count(),
            pins = self.manager.alignment().anchors().len(),
            "load finished"
        );
        Ok(())
    }

    fn start_save(&mut self) {
        let Some(state) = self.manager.begin_save(&mut self.tracker, self.clock) else {
            return;
        };
        let platform = self.tracker.platform_store().clone();
        let store = self.store.clone();
        self.saving = Some(tokio::task::spawn_blocking(move || {
            store.save_state(&state)?;
            store.save_platform(&platform)
        }));
    }

    async fn poll_save(&mut self, report: &mut SessionReport) {
        if self.saving.as_ref().is_some_and(|h| h.is_finished())
            && let Some(handle) = self.saving.take()
        {
            self.complete_save(handle, report).await;
        }
    }

    async fn complete_save(
        &mut self,
        handle: JoinHandle<wl_store::Result<()>>,
        report: &mut SessionReport,
    ) {
        match handle.await {
            Ok(Ok(())) => report.saves += 1,
            Ok(Err(e)) => {
                warn!(error = %e, "autosave failed");
                report.save_failures += 1;
            }
            Err(e) => {
                warn!(error = %e, "autosave task panicked");
                report.save_failures += 1;
            }
        }
        self.manager.finish_save();
    }
}

/// Head position at time `t` on a circle at standing height.
fn walk_position(opts: &SessionOptions, t: f64) -> Vec3 {
    if opts.radius <= 0.0 {
        return Vec3::new(0.0, 1.6, 0.0);
    }
    let theta = opts.speed * t / opts.radius;
    Vec3::new(
        opts.radius * theta.cos(),
        1.6,
        opts.radius * theta.sin(),
    )
}
