//! Durable record of identifiers already attempted by an interrupted run.
//!
//! The file is a JSON array of identifier strings. Presence means a previous
//! run did not finish; absence means a clean start.

use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::CheckpointError;

/// Identifiers recorded as processed. Ordered so the file is stable.
pub type CheckpointSet = BTreeSet<String>;

pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CheckpointStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the persisted set, or an empty set when no checkpoint exists.
    pub fn load(&self) -> Result<CheckpointSet, CheckpointError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CheckpointSet::new()),
            Err(source) => {
                return Err(CheckpointError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let ids: Vec<String> =
            serde_json::from_str(&raw).map_err(|source| CheckpointError::Decode {
                path: self.path.clone(),
                source,
            })?;
        info!(
            path = %self.path.display(),
            count = ids.len(),
            "Resuming from checkpoint"
        );
        Ok(ids.into_iter().collect())
    }

    /// Replaces the persisted set. Writes a sibling temp file and renames it
    /// over the checkpoint, so a reader sees either the old or the new set.
    pub fn save(&self, ids: &CheckpointSet) -> Result<(), CheckpointError> {
        let payload = serde_json::to_vec(ids).map_err(CheckpointError::Encode)?;
        let write_err = |source: std::io::Error| CheckpointError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let tmp_path = match self.path.file_name() {
            Some(name) => self
                .path
                .with_file_name(format!("{}.tmp", name.to_string_lossy())),
            None => self.path.with_extension("tmp"),
        };

        let mut file = fs::File::create(&tmp_path).map_err(write_err)?;
        file.write_all(&payload).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), count = ids.len(), "Checkpoint saved");
        Ok(())
    }

    /// Deletes the checkpoint. A missing file is not an error.
    pub fn clear(&self) -> Result<(), CheckpointError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}
