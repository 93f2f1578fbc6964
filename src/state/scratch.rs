//! Retention (scratch) directory for replaced nodes.
//!
//! Removed nodes are renamed to `<scratch-dir>/<uuid>` so they can be
//! restored byte-for-byte. No sidecar metadata is written: the retained
//! path travels inside the serialized `Restore` step.

use std::fs;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use crate::error::{FsError, Result};

/// Scratch directory handle.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    /// Root of the scratch directory.
    root: PathBuf,
}

impl ScratchDir {
    /// Creates a handle; the directory is created lazily on first use.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensures the scratch directory exists.
    fn ensure_dir(&self) -> Result<()> {
        if !self.root.is_dir() {
            debug!("Creating scratch directory: {}", self.root.display());
            fs::create_dir_all(&self.root).map_err(|source| FsError::Scratch {
                path: self.root.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Allocates a fresh, globally unique path inside the scratch directory.
    ///
    /// Nothing is created at the returned path.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be created.
    pub fn allocate(&self) -> Result<PathBuf> {
        self.ensure_dir()?;
        Ok(self.root.join(Uuid::new_v4().simple().to_string()))
    }
}
