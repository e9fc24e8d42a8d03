//! Recognized configuration options.
//!
//! Every field has a default, so a partial TOML/JSON document deserializes.
//! Keys are snake_case; the camelCase spellings are accepted as aliases.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_ANCHOR_ADD_OUT_TIME, DEFAULT_GROUND_ANCHOR_OFFSET, DEFAULT_MAX_ANCHOR_EDGE_LENGTH,
    DEFAULT_MIN_NEW_ANCHOR_DISTANCE, DEFAULT_SAVE_INTERVAL, DEFAULT_TRACKING_START_DELAY,
};
use crate::orientation::OrienterConfig;

/// Anchor density and timing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorSettings {
    /// No new anchor is created while one exists within this radius (meters).
    #[serde(alias = "minNewAnchorDistance")]
    pub min_new_anchor_distance: f64,

    /// New anchors get edges to existing anchors within this radius (meters).
    #[serde(alias = "maxAnchorEdgeLength")]
    pub max_anchor_edge_length: f64,

    /// Cull the farthest anchors beyond this count. 0 disables culling.
    #[serde(alias = "maxLocalAnchors")]
    pub max_local_anchors: usize,

    /// Seconds after tracking resumes during which no anchor is created.
    #[serde(alias = "trackingStartDelay")]
    pub tracking_start_delay: f64,

    /// Minimum seconds between consecutive anchor creations.
    #[serde(alias = "anchorAddOutTime")]
    pub anchor_add_out_time: f64,

    /// Distance below the head at which new anchors are placed (meters).
    #[serde(alias = "groundAnchorOffset")]
    pub ground_anchor_offset: f64,
}

impl Default for AnchorSettings {
    fn default() -> Self {
        Self {
            min_new_anchor_distance: DEFAULT_MIN_NEW_ANCHOR_DISTANCE,
            max_anchor_edge_length: DEFAULT_MAX_ANCHOR_EDGE_LENGTH,
            max_local_anchors: 0,
            tracking_start_delay: DEFAULT_TRACKING_START_DELAY,
            anchor_add_out_time: DEFAULT_ANCHOR_ADD_OUT_TIME,
            ground_anchor_offset: DEFAULT_GROUND_ANCHOR_OFFSET,
        }
    }
}

impl AnchorSettings {
    pub fn is_valid(&self) -> bool {
        self.min_new_anchor_distance > 0.0
            && self.max_anchor_edge_length > self.min_new_anchor_distance
            && self.tracking_start_delay >= 0.0
            && self.anchor_add_out_time >= 0.0
    }

    /// Self if valid, otherwise defaults (with a warning).
    pub fn validated(self) -> Self {
        if self.is_valid() {
            return self;
        }
        warn!(
            min_new_anchor_distance = self.min_new_anchor_distance,
            max_anchor_edge_length = self.max_anchor_edge_length,
            "invalid anchor settings, max edge length must exceed min anchor distance; using defaults"
        );
        Self::default()
    }
}

/// Top-level engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Toggles stabilization entirely.
    pub enabled: bool,
    #[serde(alias = "autoSave")]
    pub auto_save: bool,
    #[serde(alias = "autoLoad")]
    pub auto_load: bool,
    #[serde(alias = "autoMerge")]
    pub auto_merge: bool,
    #[serde(alias = "autoRefreeze")]
    pub auto_refreeze: bool,
    /// Seconds between automatic saves.
    #[serde(alias = "saveInterval")]
    pub save_interval: f64,
    pub anchors: AnchorSettings,
    pub orientation: OrienterConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: true,
            auto_load: true,
            auto_merge: true,
            auto_refreeze: true,
            save_interval: DEFAULT_SAVE_INTERVAL,
            anchors: AnchorSettings::default(),
            orientation: OrienterConfig::default(),
        }
    }
}

impl Settings {
    /// Settings with invalid sections reset to their defaults.
    pub fn validated(mut self) -> Self {
        self.anchors = self.anchors.validated();
        if self.save_interval <= 0.0 {
            warn!(
                save_interval = self.save_interval,
                "save interval must be positive; using default"
            );
            self.save_interval = DEFAULT_SAVE_INTERVAL;
        }
        if !self.orientation.is_valid() {
            warn!(
                min_leg_length = self.orientation.min_leg_length,
                collinear_dot_limit = self.orientation.collinear_dot_limit,
                "invalid orientation settings; using defaults"
            );
            self.orientation = OrienterConfig::default();
        }
        self
    }
}
