//! Settings loaded from TOML.
//!
//! ```toml
//! enabled = true
//! save_interval = 30.0
//!
//! [anchors]
//! min_new_anchor_distance = 1.0
//! max_anchor_edge_length = 1.2
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;
use wl_core::Settings;

use crate::error::{Result, StoreError};

/// Parse settings from TOML text. Invalid values fall back to defaults.
pub fn parse_settings(text: &str) -> Result<Settings> {
    let settings: Settings = toml::from_str(text)?;
    Ok(settings.validated())
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
        _ => StoreError::Io(e),
    })?;
    let settings = parse_settings(&text)?;
    debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

/// Settings from `path` if that file exists, otherwise defaults.
pub fn load_settings_or_default(path: &Path) -> Result<Settings> {
    match load_settings(path) {
        Err(StoreError::NotFound(_)) => Ok(Settings::default()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_document_uses_defaults() {
        let s = parse_settings("auto_save = false\n[anchors]\nmax_local_anchors = 40\n").unwrap();
        assert!(!s.auto_save);
        assert!(s.enabled);
        assert_eq!(s.anchors.max_local_anchors, 40);
        assert_eq!(s.anchors.min_new_anchor_distance, 1.0);
    }

    #[test]
    fn test_camel_case_aliases() {
        let s = parse_settings("autoLoad = false\n[anchors]\nminNewAnchorDistance = 0.5\nmaxAnchorEdgeLength = 0.9\n")
            .unwrap();
        assert!(!s.auto_load);
        assert_eq!(s.anchors.min_new_anchor_distance, 0.5);
        assert_eq!(s.anchors.max_anchor_edge_length, 0.9);
    }

    #[test]
    fn test_invalid_edge_length_resets_anchor_settings() {
        let s = parse_settings("[anchors]\nmin_new_anchor_distance = 2.0\nmax_anchor_edge_length = 1.0\n")
            .unwrap();
        assert_eq!(s.anchors, wl_core::AnchorSettings::default());
    }

    #[test]
    fn test_orientation_section() {
        let s = parse_settings("[orientation]\ncollinear_dot_limit = 0.9\n").unwrap();
        assert_eq!(s.orientation.collinear_dot_limit, 0.9);
        assert_eq!(s.orientation.min_leg_length, 0.01);
    }

    #[test]
    fn test_malformed_toml_is_error() {
        assert!(matches!(parse_settings("enabled = ="), Err(StoreError::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        assert!(matches!(load_settings(&path), Err(StoreError::NotFound(_))));
        assert_eq!(load_settings_or_default(&path).unwrap(), Settings::default());

        fs::write(&path, "enabled = false\n").unwrap();
        assert!(!load_settings_or_default(&path).unwrap().enabled);
    }
}
