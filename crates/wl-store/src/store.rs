use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use wl_core::{AlignmentSnapshot, PlatformAnchorStore, SavedState, SolverSnapshot};

use crate::error::{Result, StoreError};
use crate::record;
use crate::rotation::RotatingFile;

pub const ANCHORS_FILE: &str = "anchor_graph.json";
pub const ALIGNMENT_FILE: &str = "alignment.json";
pub const PLATFORM_FILE: &str = "platform_anchors.json";
pub const SETTINGS_FILE: &str = "settings.toml";

/// Default base directory for persisted state.
pub fn default_base_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".world-locking")
}

/// Sizes of the primary generation of each record, when present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub anchors_bytes: Option<u64>,
    pub alignment_bytes: Option<u64>,
    pub platform_bytes: Option<u64>,
}

/// One directory holding the anchor-graph, alignment and platform-anchor
/// records, each in its own rotating file.
#[derive(Clone, Debug)]
pub struct StateStore {
    dir: PathBuf,
    anchors: RotatingFile,
    alignment: RotatingFile,
    platform: RotatingFile,
}

impl StateStore {
    /// Open (creating if needed) the store under `base_dir`, or the default.
    pub fn open(base_dir: Option<&Path>) -> Result<Self> {
        let dir = base_dir.map(PathBuf::from).unwrap_or_else(default_base_dir);
        fs::create_dir_all(&dir).map_err(|e| {
            StoreError::InvalidData(format!("failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self {
            anchors: RotatingFile::new(dir.join(ANCHORS_FILE)),
            alignment: RotatingFile::new(dir.join(ALIGNMENT_FILE)),
            platform: RotatingFile::new(dir.join(PLATFORM_FILE)),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.dir.join(SETTINGS_FILE)
    }

    pub fn has_state(&self) -> bool {
        self.anchors.exists() || self.alignment.exists()
    }

    // --- Save ---

    pub fn save_state(&self, state: &SavedState) -> Result<()> {
        save_record(&self.anchors, &state.anchors)?;
        save_record(&self.alignment, &state.alignment)?;
        info!(
            anchors = state.anchors.frozen_anchors.len(),
            edges = state.anchors.frozen_edges.len(),
            pins = state.alignment.pins.len(),
            "saved world locking state"
        );
        Ok(())
    }

    pub fn save_platform(&self, platform: &PlatformAnchorStore) -> Result<()> {
        save_record(&self.platform, platform)
    }

    // --- Load ---

    /// Both records, each falling back to its `.old` generation.
    ///
    /// `Ok(None)` when neither record exists. A record that exists but is
    /// unreadable in every generation is an error.
    pub fn load_state(&self) -> Result<Option<SavedState>> {
        let anchors: Option<SolverSnapshot> = load_record(&self.anchors)?;
        let alignment: Option<AlignmentSnapshot> = load_record(&self.alignment)?;
        if anchors.is_none() && alignment.is_none() {
            return Ok(None);
        }
        Ok(Some(SavedState {
            anchors: anchors.unwrap_or_default(),
            alignment: alignment.unwrap_or_default(),
        }))
    }

    pub fn load_platform(&self) -> Result<Option<PlatformAnchorStore>> {
        load_record(&self.platform)
    }

    /// Write time (Unix seconds) of the anchor-graph record.
    pub fn anchors_timestamp(&self) -> Option<u64> {
        self.anchors
            .read_with(|bytes| Ok(record::decode::<SolverSnapshot>(bytes)?.timestamp))
            .ok()
            .flatten()
    }

    // --- Maintenance ---

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            anchors_bytes: self.anchors.size(),
            alignment_bytes: self.alignment.size(),
            platform_bytes: self.platform.size(),
        }
    }

    /// Delete every record, all generations.
    pub fn reset(&self) -> Result<()> {
        self.anchors.remove()?;
        self.alignment.remove()?;
        self.platform.remove()?;
        info!(dir = %self.dir.display(), "removed persisted state");
        Ok(())
    }
}

fn save_record<T: Serialize>(file: &RotatingFile, data: &T) -> Result<()> {
    let bytes = record::encode(data)?;
    file.write(&bytes)
}

fn load_record<T: DeserializeOwned>(file: &RotatingFile) -> Result<Option<T>> {
    let loaded = file.read_with(|bytes| Ok(record::decode::<T>(bytes)?.data))?;
    if loaded.is_none() && file.new_path().exists() {
        warn!(path = %file.path().display(), "only an uncommitted .new generation exists, ignoring");
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use tempfile::TempDir;
    use wl_core::{AnchorId, Edge, FragmentId, FrozenAnchor, Pose, Quaternion, SavedPin, Vec3};

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    fn pose_bits(p: &Pose) -> [u64; 7] {
        let (v, q) = (p.position, p.rotation);
        [v.x, v.y, v.z, q.w, q.x, q.y, q.z].map(f64::to_bits)
    }

    fn sample_state() -> SavedState {
        let anchor = |id: u64, x: f64| FrozenAnchor {
            id: AnchorId(id),
            fragment: FragmentId(1),
            pose: Pose::from_position(Vec3::new(x, 0.0, 0.0)),
        };
        SavedState {
            anchors: SolverSnapshot {
                frozen_anchors: vec![anchor(1, 0.0), anchor(2, 1.1)],
                frozen_edges: vec![Edge::new(AnchorId(1), AnchorId(2))],
                ..SolverSnapshot::default()
            },
            alignment: AlignmentSnapshot {
                pins: vec![SavedPin {
                    name: "pin0".to_string(),
                    fragment: FragmentId(1),
                    model_pose: Pose::identity(),
                    locked_pose: Pose::identity(),
                }],
            },
        }
    }

    #[test]
    fn test_empty_store_loads_none() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        assert!(!store.has_state());
        assert!(store.load_state().unwrap().is_none());
        assert!(store.load_platform().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        let state = sample_state();
        store.save_state(&state).unwrap();

        assert!(store.has_state());
        assert_eq!(store.load_state().unwrap(), Some(state));
        assert!(store.anchors_timestamp().unwrap() > 0);
    }

    #[test]
    fn test_arbitrary_poses_reload_bit_exact() {
        let mut rng = rng();
        let frozen_anchors: Vec<FrozenAnchor> = (1..=200)
            .map(|id| {
                let position = Vec3::new(
                    rng.random_range(-50.0..50.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-50.0..50.0),
                );
                let rotation = Quaternion::new(
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                    rng.random_range(-1.0..1.0),
                )
                .normalize();
                FrozenAnchor {
                    id: AnchorId(id),
                    fragment: FragmentId(1 + id % 3),
                    pose: Pose::new(position, rotation),
                }
            })
            .collect();
        let state = SavedState {
            anchors: SolverSnapshot {
                frozen_anchors,
                alignment: Some(Pose::new(
                    Vec3::new(0.1, 0.2, 0.3),
                    Quaternion::from_yaw(rng.random_range(-3.0..3.0)),
                )),
                ..SolverSnapshot::default()
            },
            ..SavedState::default()
        };

        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        store.save_state(&state).unwrap();
        let loaded = store.load_state().unwrap().unwrap();

        assert_eq!(loaded.anchors.frozen_anchors.len(), 200);
        let pairs = state.anchors.frozen_anchors.iter().zip(&loaded.anchors.frozen_anchors);
        for (saved, back) in pairs {
            assert_eq!(saved.id, back.id);
            assert_eq!(pose_bits(&saved.pose), pose_bits(&back.pose), "{:?}", saved.id);
        }
        let (a, b) = (state.anchors.alignment.unwrap(), loaded.anchors.alignment.unwrap());
        assert_eq!(pose_bits(&a), pose_bits(&b));
    }

    #[test]
    fn test_corrupt_primary_uses_old_generation() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        let state = sample_state();
        store.save_state(&state).unwrap();
        store.save_state(&SavedState::default()).unwrap();

        fs::write(dir.path().join(ANCHORS_FILE), b"{ truncated").unwrap();
        let loaded = store.load_state().unwrap().unwrap();
        assert_eq!(loaded.anchors, state.anchors);
        assert!(loaded.alignment.pins.is_empty());
    }

    #[test]
    fn test_both_generations_corrupt_is_error() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        fs::write(dir.path().join(ALIGNMENT_FILE), b"nope").unwrap();
        fs::write(dir.path().join(format!("{ALIGNMENT_FILE}.old")), b"nope").unwrap();
        assert!(store.load_state().is_err());
    }

    #[test]
    fn test_platform_record() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        let mut platform = PlatformAnchorStore::default();
        platform
            .anchors
            .insert(AnchorId(4), Pose::from_position(Vec3::new(0.0, 0.0, 3.0)));
        store.save_platform(&platform).unwrap();
        assert_eq!(store.load_platform().unwrap(), Some(platform));
    }

    #[test]
    fn test_reset_and_stats() {
        let dir = TempDir::new().unwrap();
        let store = StateStore::open(Some(dir.path())).unwrap();
        store.save_state(&sample_state()).unwrap();
        let stats = store.stats();
        assert!(stats.anchors_bytes.unwrap() > 0);
        assert!(stats.platform_bytes.is_none());

        store.reset().unwrap();
        assert!(!store.has_state());
        assert_eq!(store.stats(), StoreStats::default());
    }
}
