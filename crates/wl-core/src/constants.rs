/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// SLERP near-parallel threshold, above which NLERP is used instead
pub const SLERP_THRESHOLD: f64 = 0.9995;

/// Radius (meters) inside which an existing anchor suppresses creation of a new one
pub const DEFAULT_MIN_NEW_ANCHOR_DISTANCE: f64 = 1.0;

/// Radius (meters) inside which a new anchor gets an edge to an existing one.
/// Must exceed the min new anchor distance.
pub const DEFAULT_MAX_ANCHOR_EDGE_LENGTH: f64 = 1.2;

/// Seconds after tracking resumes before new anchors may be created
pub const DEFAULT_TRACKING_START_DELAY: f64 = 0.3;

/// Minimum seconds between two consecutive anchor creations
pub const DEFAULT_ANCHOR_ADD_OUT_TIME: f64 = 0.4;

/// New anchors are placed this far (meters) below the head
pub const DEFAULT_GROUND_ANCHOR_OFFSET: f64 = 1.0;

/// Seconds between automatic saves
pub const DEFAULT_SAVE_INTERVAL: f64 = 30.0;

/// Orientation: legs shorter than this (meters) carry no directional information
pub const MIN_ORIENTATION_LEG: f64 = 0.01;

/// Orientation: |cos| above this marks a triple as collinear (~10°)
pub const COLLINEAR_DOT_LIMIT: f64 = 0.985;

/// Solver: frozen vs observed disagreement (meters) that indicates a refreeze
pub const REFREEZE_DEVIATION: f64 = 0.05;
