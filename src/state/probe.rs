//! Observed-state prober.
//!
//! One link-stat of the path, followed by a stat of the target when the
//! path is a symlink and symlinks may be followed.

use std::fs::{self, Metadata};
use std::io::ErrorKind;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tracing::debug;

use crate::error::{FsError, Result};

use super::types::{NodeType, ObservedState};

/// Prober for on-disk node state.
#[derive(Debug, Default, Clone, Copy)]
pub struct Prober;

impl Prober {
    /// Creates a new prober.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Probes `path`, following a symlink only if `allow_symlink` is set.
    ///
    /// # Errors
    ///
    /// Returns `FsError::Stat` for stat errors other than not-found.
    pub fn probe(&self, path: &Path, allow_symlink: bool) -> Result<ObservedState> {
        let link_meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} is absent", path.display());
                return Ok(ObservedState::absent());
            }
            Err(source) => {
                return Err(FsError::Stat {
                    path: path.to_path_buf(),
                    source,
                }
                .into());
            }
        };

        if !link_meta.file_type().is_symlink() {
            return Ok(Self::from_metadata(&link_meta, false, None));
        }

        let target = fs::read_link(path).map_err(|source| FsError::Stat {
            path: path.to_path_buf(),
            source,
        })?;

        if !allow_symlink {
            let mut state = Self::from_metadata(&link_meta, true, Some(target));
            state.node_type = NodeType::Symlink;
            return Ok(state);
        }

        match fs::metadata(path) {
            Ok(meta) => Ok(Self::from_metadata(&meta, true, Some(target))),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("{} is a dangling symlink to {}", path.display(), target.display());
                Ok(ObservedState {
                    is_symlink: true,
                    symlink_target: Some(target),
                    ..ObservedState::absent()
                })
            }
            Err(source) => Err(FsError::Stat {
                path: path.to_path_buf(),
                source,
            }
            .into()),
        }
    }

    fn from_metadata(
        meta: &Metadata,
        is_symlink: bool,
        symlink_target: Option<std::path::PathBuf>,
    ) -> ObservedState {
        let file_type = meta.file_type();
        let node_type = if file_type.is_file() {
            NodeType::File
        } else if file_type.is_dir() {
            NodeType::Directory
        } else if file_type.is_symlink() {
            NodeType::Symlink
        } else {
            NodeType::Other
        };

        ObservedState {
            exists: true,
            is_symlink,
            symlink_target,
            node_type,
            mode: Some(meta.mode() & 0o7777),
            uid: Some(meta.uid()),
            gid: Some(meta.gid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use tempfile::TempDir;

    #[test]
    fn test_probe_absent() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let state = Prober::new()
            .probe(&temp.path().join("missing"), false)
            .expect("probe failed");
        assert_eq!(state, ObservedState::absent());
    }

    #[test]
    fn test_probe_file() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("file");
        fs::write(&path, b"abc").expect("write failed");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).expect("chmod failed");

        let state = Prober::new().probe(&path, false).expect("probe failed");
        assert!(state.exists);
        assert!(!state.is_symlink);
        assert_eq!(state.node_type, NodeType::File);
        assert_eq!(state.mode, Some(0o640));
        assert_eq!(state.uid, Some(nix::unistd::getuid().as_raw()));
    }

    #[test]
    fn test_probe_directory() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let state = Prober::new().probe(temp.path(), false).expect("probe failed");
        assert_eq!(state.node_type, NodeType::Directory);
    }

    #[test]
    fn test_probe_symlink_not_followed() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let target = temp.path().join("target");
        let link = temp.path().join("link");
        fs::create_dir(&target).expect("mkdir failed");
        symlink(&target, &link).expect("symlink failed");

        let state = Prober::new().probe(&link, false).expect("probe failed");
        assert!(state.exists);
        assert!(state.is_symlink);
        assert_eq!(state.node_type, NodeType::Symlink);
        assert_eq!(state.symlink_target.as_deref(), Some(target.as_path()));
    }

    #[test]
    fn test_probe_symlink_followed() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let target = temp.path().join("target");
        let link = temp.path().join("link");
        fs::create_dir(&target).expect("mkdir failed");
        symlink(&target, &link).expect("symlink failed");

        let state = Prober::new().probe(&link, true).expect("probe failed");
        assert!(state.exists);
        assert!(state.is_symlink);
        assert_eq!(state.node_type, NodeType::Directory);
    }

    #[test]
    fn test_probe_dangling_symlink() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let link = temp.path().join("link");
        symlink(temp.path().join("nowhere"), &link).expect("symlink failed");

        let followed = Prober::new().probe(&link, true).expect("probe failed");
        assert!(followed.is_dangling_symlink());
        assert_eq!(followed.node_type, NodeType::Absent);

        let unfollowed = Prober::new().probe(&link, false).expect("probe failed");
        assert!(unfollowed.exists);
        assert_eq!(unfollowed.node_type, NodeType::Symlink);
    }
}
