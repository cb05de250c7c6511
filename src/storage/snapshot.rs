//! Whole-file JSON snapshots
//!
//! Each store owns one file holding a JSON array of its full record set.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! reader never observes a half-written snapshot.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{MemvaultError, Result};

/// A snapshot file on disk
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every record. A missing file is an empty store; a malformed one
    /// is an error the caller must surface.
    pub fn load<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            MemvaultError::Storage(format!(
                "malformed snapshot '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Replace the snapshot with `records`
    pub fn write<T: Serialize>(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(records)?;
        let temp_path = self.path.with_extension("json.tmp");

        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            MemvaultError::Storage(format!(
                "failed to move snapshot into place at '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}
