/*!
 * Per-job artifact directory.
 *
 * Layout under `<storage root>/job-<id>/`:
 * - `input.c`, `normalized.c`, `symbols.json`
 * - `segments/<segment_id>.c`, `segments/<segment_id>.rs`
 * - `metadata.json`, `final_output.rs`
 *
 * The directory is removed on release (or drop) unless it is retained.
 */

use log::{debug, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::MergeIoError;

pub const INPUT_FILE: &str = "input.c";
pub const NORMALIZED_FILE: &str = "normalized.c";
pub const SYMBOLS_FILE: &str = "symbols.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const FINAL_OUTPUT_FILE: &str = "final_output.rs";
pub const SEGMENTS_DIR: &str = "segments";

/// Isolated directory holding one job's artifacts
#[derive(Debug)]
pub struct JobWorkspace {
    root: PathBuf,
    retain: bool,
    released: bool,
}

impl JobWorkspace {
    /// Create `<storage_root>/job-<job_id>/` and its segments directory
    pub fn create(storage_root: &Path, job_id: &str, retain: bool) -> Result<Self, MergeIoError> {
        let root = storage_root.join(format!("job-{}", job_id));
        let segments = root.join(SEGMENTS_DIR);
        fs::create_dir_all(&segments).map_err(|e| MergeIoError::new(&segments, e))?;
        debug!("Created job workspace {:?}", root);

        Ok(Self { root, retain, released: false })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn segments_dir(&self) -> PathBuf {
        self.root.join(SEGMENTS_DIR)
    }

    pub fn is_retained(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }

    /// Write `contents` to a path relative to the workspace root
    pub fn write(&self, relative: impl AsRef<Path>, contents: &str) -> Result<PathBuf, MergeIoError> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MergeIoError::new(parent, e))?;
        }
        fs::write(&path, contents).map_err(|e| MergeIoError::new(&path, e))?;
        Ok(path)
    }

    /// Serialize `value` as pretty JSON into the workspace
    pub fn write_json<T: Serialize>(&self, relative: impl AsRef<Path>, value: &T) -> Result<PathBuf, MergeIoError> {
        let path = self.root.join(relative.as_ref());
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| MergeIoError::new(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        self.write(relative, &json)
    }

    /// Write a segment artifact, `segments/<file_name>`
    pub fn write_segment(&self, file_name: &str, contents: &str) -> Result<PathBuf, MergeIoError> {
        self.write(Path::new(SEGMENTS_DIR).join(file_name), contents)
    }

    /// Finish with the workspace.
    ///
    /// # Returns
    /// * `Ok(Some(path))` - The directory was retained
    /// * `Ok(None)` - The directory was removed
    pub fn release(mut self) -> Result<Option<PathBuf>, MergeIoError> {
        self.released = true;
        if self.retain {
            debug!("Retaining job workspace {:?}", self.root);
            return Ok(Some(self.root.clone()));
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MergeIoError::new(&self.root, e)),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released || self.retain {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove job workspace {:?}: {}", self.root, e);
            }
        }
    }
}
