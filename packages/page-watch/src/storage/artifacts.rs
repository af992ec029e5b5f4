//! Diff artifacts on disk: `<root>/<label>/<label>-<timestamp>.diff`.
//!
//! Write-only from the engine's point of view. Nothing here is read back to
//! make a decision.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{StorageError, StorageResult};
use crate::types::DiffArtifact;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

pub struct ArtifactWriter {
    root: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn label_dir(&self, label: &str) -> PathBuf {
        self.root.join(label)
    }

    /// Write `artifact` to a fresh file and return its path.
    pub fn write(&self, artifact: &DiffArtifact) -> StorageResult<PathBuf> {
        let dir = self.label_dir(&artifact.label);
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let stamp = artifact.produced_at.format(TIMESTAMP_FORMAT).to_string();
        let body = format!(
            "# {} {}{}\n{}",
            artifact.label,
            artifact.produced_at.to_rfc3339(),
            if artifact.truncated { " (truncated)" } else { "" },
            artifact.content
        );

        // Two changes within one second get numbered siblings.
        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{}-{}.diff", artifact.label, stamp),
                n => format!("{}-{}-{}.diff", artifact.label, stamp, n),
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(body.as_bytes())
                        .map_err(|e| StorageError::io(&path, e))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(StorageError::io(&path, e)),
            }
        }
    }

    /// Delete every artifact for `label`. Missing directories are fine.
    pub fn remove_label(&self, label: &str) -> StorageResult<()> {
        let dir = self.label_dir(label);
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }

    /// Artifact paths for `label`, oldest first.
    pub fn list(&self, label: &str) -> StorageResult<Vec<PathBuf>> {
        let dir = self.label_dir(label);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&dir, e)),
        };

        let mut paths = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "diff"))
            .collect::<Vec<_>>();
        paths.sort();
        Ok(paths)
    }
}
