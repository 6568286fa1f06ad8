//! Durable resume position
//!
//! The checkpoint is a small JSON document:
//!
//! ```json
//! {"offset": 1500, "loaded_rows": 1480}
//! ```
//!
//! `offset` counts every source record already handled (committed or
//! skipped), so resuming restarts the page source exactly there. Writes go
//! to a sibling temp file that is synced and then renamed over the target, so
//! a crash mid-write leaves the previous checkpoint intact.

use crate::error::CheckpointError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resume position persisted between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Source records consumed so far
    pub offset: u64,
    /// Observations committed so far, across all runs
    #[serde(rename = "loaded_rows", alias = "committed_count")]
    pub committed_count: u64,
}

impl Checkpoint {
    pub fn new(offset: u64, committed_count: u64) -> Self {
        Self {
            offset,
            committed_count,
        }
    }

    /// Position after a batch of `committed` observations and `skipped`
    /// invalid records has been made durable
    pub fn advance(self, committed: u64, skipped: u64) -> Self {
        Self {
            offset: self.offset + committed + skipped,
            committed_count: self.committed_count + committed,
        }
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling temp file: the full file name with `.tmp` appended
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Read the checkpoint, or the zero checkpoint if none exists
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No checkpoint, starting from zero");
                return Ok(Checkpoint::default());
            },
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&contents).map_err(|source| CheckpointError::Format {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Atomically replace the stored checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let json = serde_json::to_vec(checkpoint).map_err(|source| CheckpointError::Format {
            path: self.path.display().to_string(),
            source,
        })?;

        let tmp = self.temp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| self.io_error(e))?;
        file.write_all(&json).map_err(|e| self.io_error(e))?;
        file.sync_all().map_err(|e| self.io_error(e))?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        debug!(
            path = %self.path.display(),
            offset = checkpoint.offset,
            loaded_rows = checkpoint.committed_count,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove the checkpoint; a missing file is not an error
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}
