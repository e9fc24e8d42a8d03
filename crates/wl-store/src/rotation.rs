//! Three-generation file rotation.
//!
//! A write goes to `<name>.new`, the current `<name>` is demoted to
//! `<name>.old`, then `.new` is promoted to `<name>`. A crash at any point
//! leaves at least one complete copy. Reads try `<name>`, then `<name>.old`.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, StoreError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RotatingFile {
    path: PathBuf,
}

impl RotatingFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn new_path(&self) -> PathBuf {
        self.with_suffix(".new")
    }

    pub fn old_path(&self) -> PathBuf {
        self.with_suffix(".old")
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Whether a readable generation (primary or old) is on disk.
    pub fn exists(&self) -> bool {
        self.path.exists() || self.old_path().exists()
    }

    /// Size of the primary generation in bytes.
    pub fn size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let new_path = self.new_path();
        let mut file = File::create(&new_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        if self.path.exists() {
            let old_path = self.old_path();
            remove_if_exists(&old_path)?;
            fs::rename(&self.path, &old_path)?;
        }
        fs::rename(&new_path, &self.path)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "wrote rotating file");
        Ok(())
    }

    /// Parse the first generation that reads and parses cleanly.
    ///
    /// `Ok(None)` when no generation exists; the last error when every
    /// existing generation failed.
    pub fn read_with<T>(&self, parse: impl Fn(&[u8]) -> Result<T>) -> Result<Option<T>> {
        let mut last_err = None;
        for path in [self.path.clone(), self.old_path()] {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to read, trying fallback");
                    last_err = Some(StoreError::Io(e));
                    continue;
                }
            };
            match parse(&bytes) {
                Ok(value) => return Ok(Some(value)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt record, trying fallback");
                    last_err = Some(e);
                }
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Delete every generation.
    pub fn remove(&self) -> Result<()> {
        for path in [self.path.clone(), self.old_path(), self.new_path()] {
            remove_if_exists(&path)?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
